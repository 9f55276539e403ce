use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_document_tokens")]
    pub max_document_tokens: usize,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            max_document_tokens: default_max_document_tokens(),
            chars_per_token: default_chars_per_token(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".talentgate/index.db")
}
fn default_max_document_tokens() -> usize {
    8192
}
fn default_chars_per_token() -> usize {
    4
}
fn default_snippet_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_completion_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_openai_base_url(),
            model: None,
            api_key_env: default_api_key_env(),
            max_retries: default_completion_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_openai_base_url(),
            model: None,
            api_key_env: default_api_key_env(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_completion_retries() -> u32 {
    3
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_source_folder")]
    pub folder: String,
    #[serde(default = "default_source_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            base_url: None,
            folder: default_source_folder(),
            token_env: default_source_token_env(),
            root: None,
        }
    }
}

fn default_source_kind() -> String {
    "filesystem".to_string()
}
fn default_source_folder() -> String {
    "Resumes".to_string()
}
fn default_source_token_env() -> String {
    "TALENTGATE_SOURCE_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_document_dir")]
    pub document_dir: PathBuf,
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            document_dir: default_document_dir(),
            metadata_path: default_metadata_path(),
        }
    }
}

fn default_document_dir() -> PathBuf {
    PathBuf::from(".talentgate/documents")
}
fn default_metadata_path() -> PathBuf {
    PathBuf::from(".talentgate/metadata.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccessConfig {
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
    #[serde(default = "default_document_roles")]
    pub document_roles: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admin_role: default_admin_role(),
            document_roles: default_document_roles(),
        }
    }
}

fn default_admin_role() -> String {
    "Admin".to_string()
}
fn default_document_roles() -> Vec<String> {
    vec!["Recruiter".to_string(), "Admin".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate index budgets
    if config.index.max_document_tokens == 0 {
        anyhow::bail!("index.max_document_tokens must be > 0");
    }
    if config.index.chars_per_token == 0 {
        anyhow::bail!("index.chars_per_token must be > 0");
    }
    if config.index.snippet_chars == 0 {
        anyhow::bail!("index.snippet_chars must be > 0");
    }

    // Validate completion
    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.completion.is_enabled() && config.completion.model.is_none() {
        anyhow::bail!(
            "completion.model must be specified when provider is '{}'",
            config.completion.provider
        );
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    // Validate document source
    match config.source.kind.as_str() {
        "filesystem" => {
            if config.source.root.is_none() {
                anyhow::bail!("source.root must be set when source.kind is 'filesystem'");
            }
        }
        "http" => {
            if config.source.base_url.is_none() {
                anyhow::bail!("source.base_url must be set when source.kind is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown source kind: '{}'. Must be filesystem or http.",
            other
        ),
    }

    Ok(config)
}
