//! End-to-end tests for the engine and the HTTP server.
//!
//! These tests drive the real dispatch, translation, execution, ingestion,
//! and search pipelines against temporary SQLite databases, with scripted
//! completion and embedding fakes standing in for the remote services.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{ConnectOptions, Connection};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use talentgate::completion::{CompletionError, CompletionErrorKind, CompletionService, CompletionState};
use talentgate::config::Config;
use talentgate::embedding::{EmbeddingProvider, EmbeddingState};
use talentgate::engine::Engine;
use talentgate::error::EngineError;
use talentgate::models::{AnswerFormat, QueryIntent, Role, SourceFile};
use talentgate::server::run_server;
use talentgate::source::DocumentSource;
use tempfile::TempDir;

// ─── Scripted Completion ────────────────────────────────────────────

/// A completion fake that answers by prompt content. The first rule whose
/// needle appears in the prompt wins; the response `"__quota__"` simulates
/// quota exhaustion.
struct ScriptedCompletion {
    rules: Vec<(&'static str, &'static str)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    fn new(rules: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            rules,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        for (needle, response) in &self.rules {
            if prompt.contains(needle) {
                if *response == "__quota__" {
                    return Err(CompletionError::new(
                        CompletionErrorKind::QuotaExceeded,
                        "Quota exceeded: completion credits are exhausted.",
                    ));
                }
                return Ok(response.to_string());
            }
        }
        Err(CompletionError::new(
            CompletionErrorKind::Unexpected,
            format!("no scripted response for prompt: {}", prompt),
        ))
    }
}

// ─── Static Embedding ───────────────────────────────────────────────

/// Embeds by keyword so similarity ranking is deterministic: Rust-flavored
/// texts land on one axis, Python-flavored on the other.
struct StaticEmbedding {
    calls: AtomicUsize,
}

impl StaticEmbedding {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        if lower.contains("rust") {
            vec![1.0, 0.0]
        } else if lower.contains("python") {
            vec![0.0, 1.0]
        } else {
            vec![0.6, 0.8]
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedding {
    fn model_name(&self) -> &str {
        "static"
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

// ─── In-Memory Source ───────────────────────────────────────────────

/// A document source serving hardcoded files from memory.
struct InMemorySource {
    files: Vec<(SourceFile, Vec<u8>)>,
}

impl InMemorySource {
    fn new(files: Vec<(&'static str, Vec<u8>)>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(name, bytes)| {
                    (
                        SourceFile {
                            name: name.to_string(),
                            last_modified: "2026-03-01T10:00:00Z".to_string(),
                            size: Some(bytes.len() as u64),
                            handle: name.to_string(),
                        },
                        bytes,
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    fn name(&self) -> &str {
        "inmemory"
    }

    async fn list_files(&self, _folder: &str) -> Result<Vec<SourceFile>> {
        Ok(self.files.iter().map(|(file, _)| file.clone()).collect())
    }

    async fn download(&self, file: &SourceFile) -> Result<Vec<u8>> {
        self.files
            .iter()
            .find(|(f, _)| f.handle == file.handle)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", file.handle))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn docx_bytes(text: &str) -> Vec<u8> {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>"#,
        text
    );
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

async fn seed_store(path: &Path) {
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(&format!(
        "sqlite:{}",
        path.display()
    ))
    .unwrap()
    .create_if_missing(true);
    let mut conn = options.connect().await.unwrap();
    sqlx::query(
        "CREATE TABLE Candidate (
            CandidateID INTEGER NOT NULL,
            FullName VARCHAR(200),
            Score REAL
        )",
    )
    .execute(&mut conn)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO Candidate VALUES
            (1, 'Asha Patel', 88.5),
            (2, 'Ben Okafor', 74.0),
            (3, 'Carla Mendes', 91.25),
            (4, 'Dmitri Volkov', 66.0),
            (5, 'Elena Rossi', 82.75),
            (6, 'Farid Khan', 79.5),
            (7, 'Grace Liu', 95.0)",
    )
    .execute(&mut conn)
    .await
    .unwrap();
    conn.close().await.unwrap();
}

fn test_config(tmp: &TempDir, bind: &str) -> Config {
    let root = tmp.path();
    let config_content = format!(
        r#"
[store]
path = "{}/store.db"

[index]
path = "{}/index.db"

[ingest]
document_dir = "{}/documents"
metadata_path = "{}/metadata.json"

[server]
bind = "{}"
"#,
        root.display(),
        root.display(),
        root.display(),
        root.display(),
        bind
    );
    toml::from_str(&config_content).unwrap()
}

async fn seeded_engine(
    tmp: &TempDir,
    completion: Arc<ScriptedCompletion>,
) -> Engine {
    let config = test_config(tmp, "127.0.0.1:0");
    seed_store(&config.store.path).await;
    Engine::new(
        config,
        CompletionState::Ready(completion),
        EmbeddingState::Disabled {
            reason: "not configured".to_string(),
        },
    )
}

fn role(name: &str) -> Role {
    Role {
        id: 1,
        name: name.to_string(),
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/api/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

// ─── Structured Query Path ──────────────────────────────────────────

/// Prove that a mutating question from a non-admin is refused before any
/// translation request goes out.
#[tokio::test]
async fn test_mutation_question_denied_before_translation() {
    let tmp = TempDir::new().unwrap();
    let completion = Arc::new(ScriptedCompletion::new(vec![
        ("classify user questions", "database_query"),
        ("suggest the most relevant table", "Candidate"),
    ]));
    let engine = seeded_engine(&tmp, completion.clone()).await;

    let err = engine
        .answer("delete all candidates", &[role("Recruiter")], false)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::PermissionDenied(_)));
    assert_eq!(
        err.to_string(),
        "You don't have permission to perform data modification operations"
    );
    assert!(
        !completion
            .prompts()
            .iter()
            .any(|p| p.contains("Convert this question into a SQL query")),
        "translation must not be attempted for a refused question"
    );
}

/// Prove that a generated `TOP n` clause is rewritten to `LIMIT n` and the
/// statement runs against the store: SQLite itself would reject `TOP`.
#[tokio::test]
async fn test_top_clause_rewritten_and_rows_returned() {
    let tmp = TempDir::new().unwrap();
    let completion = Arc::new(ScriptedCompletion::new(vec![
        ("classify user questions", "database_query"),
        ("suggest the most relevant table", "Candidate"),
        (
            "Convert this question into a SQL query",
            "```sql\nSELECT TOP 5 FullName FROM Candidate ORDER BY FullName\n```",
        ),
    ]));
    let engine = seeded_engine(&tmp, completion).await;

    let answer = engine
        .answer(
            "Show me the top 5 candidates by name",
            &[role("Recruiter")],
            true,
        )
        .await
        .unwrap();

    assert_eq!(answer.intent, QueryIntent::StructuredData);
    assert_eq!(answer.format, AnswerFormat::Table);
    assert_eq!(answer.rows.len(), 5);
    assert_eq!(
        answer.rows[0].get("FullName").and_then(|v| v.as_str()),
        Some("Asha Patel")
    );
}

/// Prove that quota exhaustion during answer synthesis degrades to the raw
/// rows plus an apology instead of failing the whole request.
#[tokio::test]
async fn test_synthesis_quota_degrades_to_rows() {
    let tmp = TempDir::new().unwrap();
    let completion = Arc::new(ScriptedCompletion::new(vec![
        ("classify user questions", "database_query"),
        ("suggest the most relevant table", "Candidate"),
        (
            "Convert this question into a SQL query",
            "SELECT FullName, Score FROM Candidate ORDER BY Score DESC LIMIT 3",
        ),
        ("results of a query against", "__quota__"),
    ]));
    let engine = seeded_engine(&tmp, completion).await;

    let answer = engine
        .answer("Who are the highest scoring candidates?", &[role("Recruiter")], false)
        .await
        .unwrap();

    assert_eq!(answer.format, AnswerFormat::Table);
    assert_eq!(answer.rows.len(), 3);
    assert_eq!(
        answer.message.as_deref(),
        Some("Query completed, but natural language response is unavailable due to usage limits.")
    );
}

/// Prove that an explicit table prefix naming an inaccessible object is
/// refused for a non-admin caller.
#[tokio::test]
async fn test_explicit_table_outside_role_scope_denied() {
    let tmp = TempDir::new().unwrap();
    let completion = Arc::new(ScriptedCompletion::new(vec![(
        "classify user questions",
        "database_query",
    )]));
    let engine = seeded_engine(&tmp, completion).await;

    let err = engine
        .answer(
            "[Table: Payroll] list salaries",
            &[role("Requestor")],
            false,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::PermissionDenied(_)));
    assert_eq!(
        err.to_string(),
        "You don't have permission to query the Payroll table"
    );
}

/// Prove that when every completion call hits the quota, classification
/// degrades to conversational and the caller still gets a fixed apology.
#[tokio::test]
async fn test_quota_everywhere_degrades_to_apology() {
    let tmp = TempDir::new().unwrap();
    let completion = Arc::new(ScriptedCompletion::new(vec![("", "__quota__")]));
    let engine = seeded_engine(&tmp, completion).await;

    let answer = engine
        .answer("hello there", &[role("Recruiter")], false)
        .await
        .unwrap();

    assert_eq!(answer.intent, QueryIntent::Conversational);
    assert_eq!(
        answer.message.as_deref(),
        Some("Sorry, I'm unable to respond right now due to usage limits. Please try a resume-related query or contact support.")
    );
}

// ─── Ingestion and Document Search ──────────────────────────────────

/// Prove that an ingestion pass filters non-documents, mirrors and indexes
/// new files, skips unchanged files on the next pass, and that the indexed
/// document is findable afterwards.
#[tokio::test]
async fn test_ingest_then_search_round_trip() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, "127.0.0.1:0");
    seed_store(&config.store.path).await;

    let embedding = Arc::new(StaticEmbedding::new());
    let engine = Engine::new(
        config.clone(),
        CompletionState::Disabled {
            reason: "not configured".to_string(),
        },
        EmbeddingState::Ready(embedding.clone()),
    );

    let source = InMemorySource::new(vec![
        (
            "Priya Sharma{12}.docx",
            docx_bytes("Priya Sharma is a senior Rust engineer with ten years of systems experience."),
        ),
        ("Website Privacy Policy.docx", docx_bytes("Boilerplate.")),
        ("notes.txt", b"plain text".to_vec()),
    ]);

    let report = engine.ingest_documents(&source).await.unwrap();
    assert_eq!(report.listed, 3);
    assert_eq!(report.filtered, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 0);
    assert_eq!(report.failed, 0);

    // Mirror and metadata land on disk.
    assert!(config
        .ingest
        .document_dir
        .join("Priya Sharma{12}.docx")
        .exists());
    assert!(config.ingest.metadata_path.exists());

    // With completion disabled the document path still returns ranked
    // results, with a fixed unavailability note.
    let answer = engine
        .search_documents("rust systems work", &[role("Recruiter")], 5)
        .await
        .unwrap();
    assert_eq!(answer.intent, QueryIntent::DocumentSearch);
    assert_eq!(
        answer.message.as_deref(),
        Some("Resume search completed, but natural language response is unavailable due to usage limits.")
    );
    assert_eq!(answer.results.len(), 1);
    let hit = &answer.results[0];
    assert_eq!(hit.document_id, "Priya Sharma{12}.docx");
    assert!(hit.snippet.contains("Priya Sharma"));
    assert!(hit.similarity_score > 0.99);
    assert_eq!(
        hit.metadata.get("candidate_name").and_then(|v| v.as_str()),
        Some("Priya Sharma")
    );

    // A second pass sees the same stamp and hash and re-embeds nothing.
    let calls_before = embedding.call_count();
    let report = engine.ingest_documents(&source).await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(embedding.call_count(), calls_before);
}

/// Prove that a changed document is re-downloaded, re-indexed, and its
/// metadata stamp replaced.
#[tokio::test]
async fn test_ingest_reindexes_changed_document() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, "127.0.0.1:0");
    seed_store(&config.store.path).await;

    let embedding = Arc::new(StaticEmbedding::new());
    let engine = Engine::new(
        config,
        CompletionState::Disabled {
            reason: "not configured".to_string(),
        },
        EmbeddingState::Ready(embedding.clone()),
    );

    let original = InMemorySource::new(vec![(
        "Ben Okafor.docx",
        docx_bytes("Ben Okafor writes Python services."),
    )]);
    engine.ingest_documents(&original).await.unwrap();

    let mut changed = InMemorySource::new(vec![(
        "Ben Okafor.docx",
        docx_bytes("Ben Okafor now writes Rust services."),
    )]);
    changed.files[0].0.last_modified = "2026-03-02T09:00:00Z".to_string();

    let report = engine.ingest_documents(&changed).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 0);

    let answer = engine
        .search_documents("rust services", &[role("Admin")], 5)
        .await
        .unwrap();
    assert!(answer.results[0].snippet.contains("now writes Rust"));
}

/// Prove that an unreadable document is counted as failed, writes no
/// metadata entry, and is retried on the next pass, while other files in
/// the same batch still go through.
#[tokio::test]
async fn test_unreadable_document_counted_failed_and_retried() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, "127.0.0.1:0");
    seed_store(&config.store.path).await;

    let embedding = Arc::new(StaticEmbedding::new());
    let engine = Engine::new(
        config.clone(),
        CompletionState::Disabled {
            reason: "not configured".to_string(),
        },
        EmbeddingState::Ready(embedding),
    );

    let source = InMemorySource::new(vec![
        (
            "Asha Patel{7}.docx",
            docx_bytes("Asha Patel leads Python data teams."),
        ),
        ("Broken Resume{99}.pdf", b"not a valid pdf".to_vec()),
    ]);

    let report = engine.ingest_documents(&source).await.unwrap();
    assert_eq!(report.listed, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 1);

    // Only the indexed file is remembered; the broken one re-enters the
    // next pass.
    let raw = std::fs::read_to_string(&config.ingest.metadata_path).unwrap();
    let entries: std::collections::BTreeMap<String, Value> =
        serde_json::from_str(&raw).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries.contains_key("Asha Patel{7}.docx"));

    let report = engine.ingest_documents(&source).await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 0);
}

// ─── HTTP Server ────────────────────────────────────────────────────

/// Prove the HTTP surface end to end: chat dispatch, the search permission
/// gate, schema lookup, input validation, and the health probe.
#[tokio::test]
async fn test_http_api_round_trip() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &format!("127.0.0.1:{}", port));
    seed_store(&config.store.path).await;

    let completion = Arc::new(ScriptedCompletion::new(vec![
        ("classify user questions", "conversational"),
        ("Say hello", "hello"),
        ("", "Hi there! How can I help you with recruitment today?"),
    ]));
    let engine = Engine::new(
        config,
        CompletionState::Ready(completion),
        EmbeddingState::Disabled {
            reason: "not configured".to_string(),
        },
    );

    let server_handle = tokio::spawn(async move {
        run_server(engine).await.ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    // Conversational chat answer.
    let resp = client
        .post(format!("{}/api/chat", base))
        .json(&json!({"message": "hi", "roles": [{"id": 1, "name": "Recruiter"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "conversational");
    assert_eq!(
        body["message"],
        "Hi there! How can I help you with recruitment today?"
    );

    // Empty message → 400.
    let resp = client
        .post(format!("{}/api/chat", base))
        .json(&json!({"message": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "bad_request");

    // Resume search without a document role → 403.
    let resp = client
        .post(format!("{}/api/search", base))
        .json(&json!({"query": "rust engineer", "roles": [{"id": 3, "name": "Requestor"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "permission_denied");
    assert_eq!(body["error"], "You don't have permission to search resumes.");

    // Schema lookup.
    let resp = client
        .get(format!("{}/api/schema/Candidate", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "table");
    assert!(body["schema"]
        .as_str()
        .unwrap()
        .starts_with("CREATE TABLE \"Candidate\""));

    // Unknown object → 404.
    let resp = client
        .get(format!("{}/api/schema/Payroll", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "object_not_found");

    // Health: working completion plus reachable store.
    let resp = client
        .get(format!("{}/api/health", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["completion"], "working");
    assert_eq!(body["store"], "connected");
    assert_eq!(body["embedding_enabled"], false);

    server_handle.abort();
}
