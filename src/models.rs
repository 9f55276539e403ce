//! Core data models used throughout TalentGate.
//!
//! These types represent the roles, catalog descriptions, generated
//! statements, and document records that flow through the dispatch and
//! ingestion pipelines.

use serde::{Deserialize, Serialize};

/// A single result row, column name to transport-safe value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A role attached to the caller by the identity source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// Classification of an incoming message. Closed set; any label outside it
/// coerces to `Conversational`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryIntent {
    #[serde(rename = "conversational")]
    Conversational,
    #[serde(rename = "database_query")]
    StructuredData,
    #[serde(rename = "resume_query")]
    DocumentSearch,
}

impl QueryIntent {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "conversational" => Some(Self::Conversational),
            "database_query" => Some(Self::StructuredData),
            "resume_query" => Some(Self::DocumentSearch),
            _ => None,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::StructuredData => "database_query",
            Self::DocumentSearch => "resume_query",
        }
    }
}

/// One column of a base table's structural description.
#[derive(Debug, Clone)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i64>,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Structural description of one catalog object, fetched fresh per query.
#[derive(Debug, Clone)]
pub enum SchemaDescriptor {
    Table {
        name: String,
        columns: Vec<SchemaColumn>,
    },
    View {
        name: String,
        definition: String,
    },
}

impl SchemaDescriptor {
    pub fn object_name(&self) -> &str {
        match self {
            Self::Table { name, .. } => name,
            Self::View { name, .. } => name,
        }
    }
}

/// A generated statement with its provenance.
#[derive(Debug, Clone)]
pub struct QueryStatement {
    pub sql: String,
    pub source_question: String,
    pub target_object: String,
    pub requesting_role: String,
}

/// How an answer should be presented to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerFormat {
    Text,
    Table,
}

/// Envelope produced by the answer operations.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    #[serde(rename = "type")]
    pub intent: QueryIntent,
    pub format: AnswerFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<SearchResult>,
}

impl QueryAnswer {
    pub fn text(intent: QueryIntent, message: impl Into<String>) -> Self {
        Self {
            intent,
            format: AnswerFormat::Text,
            message: Some(message.into()),
            rows: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn table(rows: Vec<Row>) -> Self {
        Self {
            intent: QueryIntent::StructuredData,
            format: AnswerFormat::Table,
            message: None,
            rows,
            results: Vec::new(),
        }
    }

    pub fn documents(message: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            intent: QueryIntent::DocumentSearch,
            format: AnswerFormat::Text,
            message: Some(message.into()),
            rows: Vec::new(),
            results,
        }
    }
}

/// Per-file ingestion metadata, keyed by filename in the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub last_modified: String,
    pub file_size: u64,
    pub content_hash: String,
    pub candidate_name: String,
}

/// A file as reported by the document source listing.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub last_modified: String,
    pub size: Option<u64>,
    /// Opaque download handle: a URL for HTTP sources, a path for
    /// filesystem sources.
    pub handle: String,
}

/// A ranked document hit returned from the semantic index.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document_id: String,
    pub snippet: String,
    pub similarity_score: f64,
    pub metadata: serde_json::Value,
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub listed: usize,
    pub filtered: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Liveness summary produced by the health probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub completion: String,
    pub store: String,
    pub embedding_enabled: bool,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}
