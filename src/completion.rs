//! Completion service abstraction and the OpenAI-compatible adapter.
//!
//! [`CompletionState`] is built once at process start and injected into the
//! engine: `Ready` wraps a live client, `Disabled` records why
//! initialization failed so consumers handle the absence by type instead of
//! null checks. Calls themselves are never retried; only initialization
//! goes through the retry policy.
//!
//! Error kinds are classified from the HTTP status and the response text,
//! because providers bury the interesting detail (quota vs. rate limit,
//! bad deployment vs. bad endpoint) in the body rather than the status.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::retry::RetryPolicy;

/// System prompt sent with every chat request.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant specialized in the Recruitment Management System's RBAC and resume search.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    Authentication,
    Resource,
    Deployment,
    RateLimited,
    Timeout,
    QuotaExceeded,
    Unexpected,
}

#[derive(Debug, Error)]
#[error("{detail}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub detail: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_quota(&self) -> bool {
        self.kind == CompletionErrorKind::QuotaExceeded
    }
}

/// Natural-language generation capability consumed via prompt/response.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Send one prompt and return the completion text.
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CompletionError>;
}

/// Completion client handle with an explicit disabled state.
#[derive(Clone)]
pub enum CompletionState {
    Ready(Arc<dyn CompletionService>),
    Disabled { reason: String },
}

impl CompletionState {
    /// Build the configured client, retrying transient initialization
    /// failures with bounded backoff. Configuration errors (missing API
    /// key variable) fail on the first attempt.
    pub async fn initialize(config: &CompletionConfig) -> Self {
        if !config.is_enabled() {
            return Self::Disabled {
                reason: "completion.provider is 'disabled'".to_string(),
            };
        }
        let policy = RetryPolicy::new(config.max_retries);
        let built = policy
            .run(
                || async { OpenAiCompletion::new(config) },
                |err: &anyhow::Error| err.downcast_ref::<std::env::VarError>().is_none(),
            )
            .await;
        match built {
            Ok(client) => Self::Ready(Arc::new(client)),
            Err(err) => {
                tracing::error!("completion client initialization failed: {:#}", err);
                Self::Disabled {
                    reason: format!("{:#}", err),
                }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(&self) -> Option<&Arc<dyn CompletionService>> {
        match self {
            Self::Ready(client) => Some(client),
            Self::Disabled { .. } => None,
        }
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Disabled { reason } => Some(reason),
        }
    }
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompletion {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("completion.model required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build completion HTTP client")?;
        Ok(Self {
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn api_error(&self, status: u16, body: &str) -> CompletionError {
        let kind = classify_completion_error(Some(status), body);
        let detail = match kind {
            CompletionErrorKind::Authentication => {
                "Authentication error: invalid or missing API key.".to_string()
            }
            CompletionErrorKind::Resource => {
                format!("Resource error: invalid endpoint URL ({}).", self.base_url)
            }
            CompletionErrorKind::Deployment => format!(
                "Deployment error: model '{}' not found or not deployed.",
                self.model
            ),
            CompletionErrorKind::RateLimited => {
                "Rate limit exceeded: please try again later.".to_string()
            }
            CompletionErrorKind::Timeout => {
                "Request timed out: check network connectivity to the completion endpoint."
                    .to_string()
            }
            CompletionErrorKind::QuotaExceeded => format!(
                "Quota exceeded: completion credits for {} are exhausted.",
                self.model
            ),
            CompletionErrorKind::Unexpected => {
                format!("Unexpected error: HTTP {}: {}", status, body)
            }
        };
        CompletionError::new(kind, detail)
    }

    fn transport_error(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::new(
                CompletionErrorKind::Timeout,
                "Request timed out: check network connectivity to the completion endpoint.",
            )
        } else if err.is_connect() {
            CompletionError::new(
                CompletionErrorKind::Resource,
                format!(
                    "Resource error: could not reach completion endpoint ({}): {}",
                    self.base_url, err
                ),
            )
        } else {
            CompletionError::new(
                CompletionErrorKind::Unexpected,
                format!("Unexpected error: {}", err),
            )
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        tracing::debug!(model = %self.model, "sending completion request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(self.api_error(status.as_u16(), &body_text));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            CompletionError::new(
                CompletionErrorKind::Unexpected,
                format!("Unexpected error: {}", e),
            )
        })?;
        parse_chat_response(&json)
    }
}

/// Extract the first choice's message content from a chat response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, CompletionError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.to_string())
        .ok_or_else(|| {
            CompletionError::new(
                CompletionErrorKind::Unexpected,
                "Invalid completion response: missing choices[0].message.content",
            )
        })
}

/// Classify an upstream failure into a [`CompletionErrorKind`].
///
/// Quota wins over everything: a 429 whose body mentions quota or credits
/// is exhaustion, not throttling, and downstream degradation depends on
/// telling those apart.
pub fn classify_completion_error(status: Option<u16>, message: &str) -> CompletionErrorKind {
    let message = message.to_lowercase();
    if message.contains("quota") || message.contains("credits") {
        return CompletionErrorKind::QuotaExceeded;
    }
    match status {
        Some(401) | Some(403) => return CompletionErrorKind::Authentication,
        Some(404) => return CompletionErrorKind::Deployment,
        Some(429) => return CompletionErrorKind::RateLimited,
        _ => {}
    }
    if message.contains("authentication") || message.contains("api key") {
        CompletionErrorKind::Authentication
    } else if message.contains("resource") || message.contains("endpoint") {
        CompletionErrorKind::Resource
    } else if message.contains("deployment") || message.contains("model") {
        CompletionErrorKind::Deployment
    } else if message.contains("rate limit") {
        CompletionErrorKind::RateLimited
    } else if message.contains("timed out") {
        CompletionErrorKind::Timeout
    } else {
        CompletionErrorKind::Unexpected
    }
}
