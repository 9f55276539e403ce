//! JSON HTTP API server.
//!
//! Exposes the engine to browser front-ends over a small JSON API. Role
//! membership arrives with each request; the server performs no session
//! handling of its own.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Classify a message and answer it |
//! | `POST` | `/api/classify` | Classify a message without answering |
//! | `POST` | `/api/search` | Semantic resume search |
//! | `GET`  | `/api/schema/{object}` | Rendered schema of one table or view |
//! | `POST` | `/api/ingest` | Run one ingestion pass against the configured source |
//! | `GET`  | `/api/health` | Service health probe |
//!
//! # Error Contract
//!
//! All error responses share one body shape:
//!
//! ```json
//! { "success": false, "error": "You don't have permission to search resumes.", "code": "permission_denied" }
//! ```
//!
//! Status codes: `403` permission denied, `404` unknown object, `400`
//! translation or execution failure, `429` upstream quota exhausted, `503`
//! completion or embedding service unavailable, `500` everything else.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::catalog;
use crate::engine::{Engine, DEFAULT_SEARCH_LIMIT};
use crate::error::EngineError;
use crate::models::{
    HealthReport, HealthStatus, IngestReport, QueryAnswer, QueryIntent, Role, SchemaDescriptor,
};
use crate::source;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and serves until the
/// process is terminated.
pub async fn run_server(engine: Engine) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let state = AppState {
        engine: Arc::new(engine),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/classify", post(handle_classify))
        .route("/api/search", post(handle_search))
        .route("/api/schema/{object}", get(handle_schema))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body shared by every endpoint.
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            EngineError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Translation(_) | EngineError::QueryExecution(_) => StatusCode::BAD_REQUEST,
            EngineError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            EngineError::ServiceUnavailable(_) | EngineError::IndexUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EngineError::Store(_) | EngineError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

// ============ POST /api/chat ============

/// JSON request body for `/api/chat`.
#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    roles: Vec<Role>,
    /// `"table"` forces raw rows for structured answers.
    #[serde(default)]
    format: Option<String>,
}

/// Handler for `POST /api/chat`.
///
/// Classifies the message, then dispatches to the conversational, structured,
/// or document path. The answer body mirrors [`QueryAnswer`].
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<QueryAnswer>, AppError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let table_format = request.format.as_deref() == Some("table");
    let answer = state
        .engine
        .answer(&request.message, &request.roles, table_format)
        .await?;
    Ok(Json(answer))
}

// ============ POST /api/classify ============

#[derive(Deserialize)]
struct ClassifyRequest {
    message: String,
    #[serde(default)]
    roles: Vec<Role>,
}

#[derive(Serialize)]
struct ClassifyResponse {
    intent: QueryIntent,
}

/// Handler for `POST /api/classify`.
async fn handle_classify(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, AppError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let intent = state
        .engine
        .classify_intent(&request.message, &request.roles)
        .await?;
    Ok(Json(ClassifyResponse { intent }))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    limit: Option<usize>,
}

/// Handler for `POST /api/search`.
///
/// Bypasses classification and searches the document index directly.
async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<QueryAnswer>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let limit = request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let answer = state
        .engine
        .search_documents(&request.query, &request.roles, limit)
        .await?;
    Ok(Json(answer))
}

// ============ GET /api/schema/{object} ============

#[derive(Serialize)]
struct SchemaResponse {
    object: String,
    kind: &'static str,
    /// Rendered structural text, as fed to the translation prompt.
    schema: String,
}

/// Handler for `GET /api/schema/{object}`.
async fn handle_schema(
    State(state): State<AppState>,
    Path(object): Path<String>,
) -> Result<Json<SchemaResponse>, AppError> {
    let descriptor = state.engine.get_object_schema(&object).await?;
    let kind = match &descriptor {
        SchemaDescriptor::Table { .. } => "table",
        SchemaDescriptor::View { .. } => "view",
    };
    Ok(Json(SchemaResponse {
        object: descriptor.object_name().to_string(),
        kind,
        schema: catalog::render(&descriptor),
    }))
}

// ============ POST /api/ingest ============

/// Handler for `POST /api/ingest`.
///
/// Builds the configured document source and runs one ingestion pass.
/// Returns the counter report; per-file failures are counted, not fatal.
async fn handle_ingest(State(state): State<AppState>) -> Result<Json<IngestReport>, AppError> {
    let source = source::from_config(&state.engine.config().source)
        .map_err(EngineError::Other)?;
    let report = state.engine.ingest_documents(source.as_ref()).await?;
    Ok(Json(report))
}

// ============ GET /api/health ============

/// Handler for `GET /api/health`.
///
/// Probes the completion service and the business store. Unhealthy reports
/// carry a 503 so load balancers can rotate the instance out.
async fn handle_health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.engine.health_check().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report))
}
