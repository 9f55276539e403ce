//! The query engine: role-aware dispatch over completion, store, and index.
//!
//! `Engine` owns the configured service states and implements the operation
//! surface: intent classification, conversational answers, structured query
//! answering, document search, schema lookup, ingestion, and the health
//! probe. Services that failed to initialize stay usable as explicit
//! disabled states; each operation decides whether that degrades the answer
//! or refuses it.

use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::Connection;

use crate::access;
use crate::catalog;
use crate::classify;
use crate::completion::{CompletionService, CompletionState};
use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingState;
use crate::error::EngineError;
use crate::execute;
use crate::index::VectorIndex;
use crate::ingest;
use crate::models::{
    HealthReport, HealthStatus, IngestReport, QueryAnswer, QueryIntent, Role, SchemaDescriptor,
    SearchResult,
};
use crate::source::DocumentSource;
use crate::synthesize;
use crate::translate;

/// Matches returned by the document path when the caller gives no limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

const CONVERSATIONAL_QUOTA_MESSAGE: &str =
    "Sorry, I'm unable to respond right now due to usage limits. Please try a resume-related query or contact support.";
const STRUCTURED_QUOTA_MESSAGE: &str =
    "Cannot process database query due to usage limits. Try a resume-related query or contact support.";
const SPECIFY_TABLE_MESSAGE: &str = "Please specify a table to query.";
const NO_RESULTS_MESSAGE: &str = "No results found for your query.";
const QUERY_SYNTHESIS_UNAVAILABLE: &str =
    "Query completed, but natural language response is unavailable due to usage limits.";
const SEARCH_SYNTHESIS_UNAVAILABLE: &str =
    "Resume search completed, but natural language response is unavailable due to usage limits.";
const RESUME_PERMISSION_MESSAGE: &str = "You don't have permission to search resumes.";

pub struct Engine {
    config: Config,
    completion: CompletionState,
    embedding: EmbeddingState,
    index: VectorIndex,
}

impl Engine {
    /// Build an engine from pre-initialized service states.
    pub fn new(config: Config, completion: CompletionState, embedding: EmbeddingState) -> Self {
        let index = VectorIndex::new(&config.index);
        Self {
            config,
            completion,
            embedding,
            index,
        }
    }

    /// Initialize both services from configuration. Never fails: a service
    /// that cannot come up is carried as a disabled state with its reason.
    pub async fn initialize(config: Config) -> Self {
        let completion = CompletionState::initialize(&config.completion).await;
        let embedding = EmbeddingState::initialize(&config.embedding).await;
        Self::new(config, completion, embedding)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedding(&self) -> &EmbeddingState {
        &self.embedding
    }

    fn completion_ready(&self) -> Result<&Arc<dyn CompletionService>, EngineError> {
        match &self.completion {
            CompletionState::Ready(service) => Ok(service),
            CompletionState::Disabled { reason } => {
                Err(EngineError::ServiceUnavailable(reason.clone()))
            }
        }
    }

    fn is_admin(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| r.name == self.config.access.admin_role)
    }

    /// Catalog objects visible to the given role set.
    pub async fn accessible_objects(&self, roles: &[Role]) -> Result<BTreeSet<String>, EngineError> {
        let mut conn = db::connect_store(&self.config.store.path).await?;
        let outcome = async {
            let catalog = catalog::list_objects(&mut conn).await?;
            let policy = access::load_policy(&mut conn).await?;
            Ok(access::resolve_accessible_objects(
                &self.config.access.admin_role,
                roles,
                &policy,
                &catalog,
            ))
        }
        .await;
        let _ = conn.close().await;
        outcome
    }

    /// Full catalog listing, tables then views.
    pub async fn list_catalog(&self) -> Result<Vec<String>, EngineError> {
        let mut conn = db::connect_store(&self.config.store.path).await?;
        let outcome = catalog::list_objects(&mut conn).await;
        let _ = conn.close().await;
        Ok(outcome?)
    }

    /// Classify a message into one of the three intents.
    pub async fn classify_intent(
        &self,
        message: &str,
        roles: &[Role],
    ) -> Result<QueryIntent, EngineError> {
        let completion = self.completion_ready()?;
        let accessible: Vec<String> = self.accessible_objects(roles).await?.into_iter().collect();
        classify::classify_intent(completion.as_ref(), message, &accessible).await
    }

    /// Classify, then dispatch to the matching handler.
    pub async fn answer(
        &self,
        question: &str,
        roles: &[Role],
        table_format: bool,
    ) -> Result<QueryAnswer, EngineError> {
        let intent = self.classify_intent(question, roles).await?;
        match intent {
            QueryIntent::Conversational => self.answer_conversational(question).await,
            QueryIntent::StructuredData => {
                self.answer_structured_query(question, roles, table_format).await
            }
            QueryIntent::DocumentSearch => {
                self.search_documents(question, roles, DEFAULT_SEARCH_LIMIT).await
            }
        }
    }

    /// Free-form chat answer. Quota exhaustion degrades to a fixed apology.
    pub async fn answer_conversational(&self, message: &str) -> Result<QueryAnswer, EngineError> {
        let completion = self.completion_ready()?;
        match completion.complete(message, 0.7, 1000).await {
            Ok(text) => Ok(QueryAnswer::text(QueryIntent::Conversational, text)),
            Err(err) if err.is_quota() => {
                tracing::warn!("conversational answer degraded by quota exhaustion");
                Ok(QueryAnswer::text(
                    QueryIntent::Conversational,
                    CONVERSATIONAL_QUOTA_MESSAGE,
                ))
            }
            Err(err) => Err(EngineError::Other(anyhow::anyhow!("{}", err))),
        }
    }

    /// Structured path: resolve the target object, translate, execute, and
    /// render. An explicit `[Table: X]` prefix wins; otherwise the
    /// completion service guesses from the accessible list.
    pub async fn answer_structured_query(
        &self,
        question: &str,
        roles: &[Role],
        table_format: bool,
    ) -> Result<QueryAnswer, EngineError> {
        let completion = self.completion_ready()?;

        let lower = question.to_lowercase();
        let table_format =
            table_format || lower.contains("tabular format") || lower.contains("table format");

        let (explicit_table, question_body) = split_table_prefix(question);
        let accessible = self.accessible_objects(roles).await?;

        let object_name = match explicit_table {
            Some(name) => {
                if !accessible.contains(&name) && !self.is_admin(roles) {
                    return Err(EngineError::PermissionDenied(format!(
                        "You don't have permission to query the {} table",
                        name
                    )));
                }
                name
            }
            None => {
                match self
                    .guess_object(completion.as_ref(), question_body, &accessible)
                    .await?
                {
                    Some(name) => name,
                    None => {
                        return Err(EngineError::Translation(SPECIFY_TABLE_MESSAGE.to_string()))
                    }
                }
            }
        };

        let descriptor = self.get_object_schema(&object_name).await?;
        let schema_text = catalog::render(&descriptor);
        let caller_role = roles.first().map(|r| r.name.as_str()).unwrap_or("");

        let statement = translate::translate(
            completion.as_ref(),
            question_body,
            &object_name,
            &schema_text,
            caller_role,
            &self.config.access.admin_role,
        )
        .await?;

        let rows = execute::execute_query(&self.config.store.path, &statement).await?;
        if rows.is_empty() {
            return Ok(QueryAnswer::text(
                QueryIntent::StructuredData,
                NO_RESULTS_MESSAGE,
            ));
        }
        if table_format {
            return Ok(QueryAnswer::table(rows));
        }

        match synthesize::rows_to_text(completion.as_ref(), &rows, question_body, &object_name)
            .await
        {
            Ok(text) => Ok(QueryAnswer::text(QueryIntent::StructuredData, text)),
            Err(EngineError::QuotaExceeded(_)) => {
                tracing::warn!("structured synthesis degraded by quota exhaustion");
                let mut answer = QueryAnswer::table(rows);
                answer.message = Some(QUERY_SYNTHESIS_UNAVAILABLE.to_string());
                Ok(answer)
            }
            Err(err) => Err(err),
        }
    }

    async fn guess_object(
        &self,
        completion: &dyn CompletionService,
        question: &str,
        accessible: &BTreeSet<String>,
    ) -> Result<Option<String>, EngineError> {
        let prompt = guess_prompt(question, accessible);
        let raw = match completion.complete(&prompt, 0.1, 20).await {
            Ok(text) => text,
            Err(err) if err.is_quota() => {
                return Err(EngineError::QuotaExceeded(
                    STRUCTURED_QUOTA_MESSAGE.to_string(),
                ))
            }
            Err(err) => return Err(EngineError::Other(anyhow::anyhow!("{}", err))),
        };

        let guess = raw.trim();
        if guess.is_empty() || guess.eq_ignore_ascii_case("unknown") || !accessible.contains(guess)
        {
            tracing::info!(guess, "object guess unusable");
            return Ok(None);
        }
        Ok(Some(guess.to_string()))
    }

    /// Semantic document search. Requires a document-search role; with the
    /// embedding service down the index is reported unavailable rather than
    /// returning empty results.
    pub async fn search_documents(
        &self,
        query: &str,
        roles: &[Role],
        limit: usize,
    ) -> Result<QueryAnswer, EngineError> {
        let allowed = roles
            .iter()
            .any(|r| self.config.access.document_roles.contains(&r.name));
        if !allowed {
            return Err(EngineError::PermissionDenied(
                RESUME_PERMISSION_MESSAGE.to_string(),
            ));
        }

        let provider = match &self.embedding {
            EmbeddingState::Ready(provider) => provider,
            EmbeddingState::Disabled { reason } => {
                return Err(EngineError::IndexUnavailable(format!(
                    "Resume search is unavailable due to embedding client initialization failure: {}",
                    reason
                )))
            }
        };

        let matches = self.index.query(provider.as_ref(), query, limit).await?;
        let results: Vec<SearchResult> = matches
            .into_iter()
            .map(|m| SearchResult {
                document_id: m.id,
                snippet: snippet_of(&m.document, self.config.index.snippet_chars),
                similarity_score: m.similarity,
                metadata: m.metadata,
            })
            .collect();

        let completion = match &self.completion {
            CompletionState::Ready(service) => service,
            CompletionState::Disabled { .. } => {
                return Ok(QueryAnswer::documents(SEARCH_SYNTHESIS_UNAVAILABLE, results))
            }
        };

        match synthesize::search_results_to_text(completion.as_ref(), &results, query).await {
            Ok(text) => Ok(QueryAnswer::documents(text, results)),
            Err(EngineError::QuotaExceeded(_)) => {
                tracing::warn!("document synthesis degraded by quota exhaustion");
                Ok(QueryAnswer::documents(SEARCH_SYNTHESIS_UNAVAILABLE, results))
            }
            Err(err) => Err(err),
        }
    }

    /// Fresh structural description of one table or view.
    pub async fn get_object_schema(
        &self,
        object_name: &str,
    ) -> Result<SchemaDescriptor, EngineError> {
        let mut conn = db::connect_store(&self.config.store.path).await?;
        let outcome = catalog::describe(&mut conn, object_name).await;
        let _ = conn.close().await;
        outcome
    }

    /// Run one ingestion pass against the given document source.
    pub async fn ingest_documents(
        &self,
        source: &dyn DocumentSource,
    ) -> Result<IngestReport, EngineError> {
        ingest::run_ingest(&self.config, source, &self.embedding, &self.index)
            .await
            .map_err(EngineError::Other)
    }

    /// Probe the completion service and the business store.
    ///
    /// Quota-limited completion or an unreachable store degrade; a hard
    /// completion failure (including a disabled service) is unhealthy.
    pub async fn health_check(&self) -> HealthReport {
        enum Probe {
            Working,
            Limited(String),
            Failed(String),
        }

        let probe = match &self.completion {
            CompletionState::Ready(service) => match service.complete("Say hello", 0.1, 10).await {
                Ok(_) => Probe::Working,
                Err(err) if err.is_quota() => Probe::Limited(err.to_string()),
                Err(err) => Probe::Failed(err.to_string()),
            },
            CompletionState::Disabled { reason } => Probe::Failed(reason.clone()),
        };

        let store = match db::connect_store(&self.config.store.path).await {
            Ok(conn) => {
                let _ = conn.close().await;
                "connected".to_string()
            }
            Err(e) => format!("error: {}", e),
        };
        let store_ok = store == "connected";

        let (status, completion) = match probe {
            Probe::Working if store_ok => (HealthStatus::Healthy, "working".to_string()),
            Probe::Working => (HealthStatus::Degraded, "working".to_string()),
            Probe::Limited(detail) => (HealthStatus::Degraded, format!("limited: {}", detail)),
            Probe::Failed(detail) => (HealthStatus::Unhealthy, format!("error: {}", detail)),
        };

        HealthReport {
            status,
            completion,
            store,
            embedding_enabled: self.embedding.is_enabled(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Split an explicit `[Table: X] question` prefix from the message.
fn split_table_prefix(question: &str) -> (Option<String>, &str) {
    let Some(rest) = question.strip_prefix("[Table:") else {
        return (None, question);
    };
    let Some((name, body)) = rest.split_once(']') else {
        return (None, question);
    };
    let name = name.trim();
    let body = body.trim_start();
    if name.is_empty() || body.is_empty() {
        return (None, question);
    }
    (Some(name.to_string()), body)
}

fn guess_prompt(question: &str, accessible: &BTreeSet<String>) -> String {
    let listed = accessible
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are an AI assistant.\n\n\
         A user asked: \"{}\"\n\n\
         Available tables: {}\n\n\
         Based on the user's question, suggest the most relevant table name from the list.\n\n\
         Respond only with the table name exactly. If unsure, reply \"Unknown\".\n",
        question, listed
    )
}

fn snippet_of(document: &str, max_chars: usize) -> String {
    document.chars().take(max_chars).collect()
}
