//! Engine error taxonomy.
//!
//! Every fallible engine operation returns one of these variants so callers
//! (HTTP layer, CLI) can map failures to a stable code without string
//! matching. Adapter-internal errors arrive through `Store` and `Other`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Role lacks access to the object, or the question requested a
    /// mutating operation.
    #[error("{0}")]
    PermissionDenied(String),
    /// The named object is neither a table nor a view in the catalog.
    #[error("{0}")]
    ObjectNotFound(String),
    /// The store rejected the generated statement.
    #[error("{0}")]
    QueryExecution(String),
    /// The completion service could not produce a usable statement.
    #[error("{0}")]
    Translation(String),
    /// Upstream usage limits exhausted.
    #[error("{0}")]
    QuotaExceeded(String),
    /// Completion client was never initialized.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Embedding client was never initialized, so the document index is
    /// unusable.
    #[error("{0}")]
    IndexUnavailable(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable code for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "permission_denied",
            Self::ObjectNotFound(_) => "object_not_found",
            Self::QueryExecution(_) => "query_execution_error",
            Self::Translation(_) => "translation_error",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::IndexUnavailable(_) => "index_unavailable",
            Self::Store(_) => "store_error",
            Self::Other(_) => "internal_error",
        }
    }
}
