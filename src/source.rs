//! Document sources for the ingestion pipeline.
//!
//! A source lists the files in a named folder and downloads their raw
//! bytes. Two implementations ship: a local filesystem walk, and a
//! Graph-style HTTP drive speaking bearer-token JSON. Listing order is
//! deterministic (sorted by file name) so repeated ingestion runs visit
//! files in the same order.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::models::SourceFile;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// List the files directly inside `folder`.
    async fn list_files(&self, folder: &str) -> Result<Vec<SourceFile>>;

    /// Fetch the raw bytes of a previously listed file.
    async fn download(&self, file: &SourceFile) -> Result<Vec<u8>>;
}

/// Build the configured source implementation.
pub fn from_config(config: &SourceConfig) -> Result<Box<dyn DocumentSource>> {
    match config.kind.as_str() {
        "filesystem" => {
            let root = config
                .root
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Filesystem source root not configured"))?;
            Ok(Box::new(FilesystemSource::new(root)))
        }
        "http" => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("HTTP drive source base_url not configured"))?;
            let token = std::env::var(&config.token_env)
                .with_context(|| format!("{} environment variable not set", config.token_env))?;
            Ok(Box::new(HttpDriveSource::new(base_url, token)?))
        }
        other => bail!("Unknown source kind: {}", other),
    }
}

/// Local directory source. The folder name resolves under a fixed root.
pub struct FilesystemSource {
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn list_files(&self, folder: &str) -> Result<Vec<SourceFile>> {
        let dir = self.root.join(folder);
        if !dir.exists() {
            bail!("Source folder does not exist: {}", dir.display());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry.metadata()?;
            let modified = metadata
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            files.push(SourceFile {
                name: entry.file_name().to_string_lossy().to_string(),
                last_modified: DateTime::<Utc>::from(modified).to_rfc3339(),
                size: Some(metadata.len()),
                handle: entry.path().to_string_lossy().to_string(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn download(&self, file: &SourceFile) -> Result<Vec<u8>> {
        std::fs::read(&file.handle).with_context(|| format!("Failed to read {}", file.handle))
    }
}

/// Graph-style HTTP drive source.
///
/// Listing hits `{base_url}/root:/{folder}:/children` with a bearer token
/// and reads the `value` array; each entry carries `name`,
/// `lastModifiedDateTime`, `size`, and a pre-authorized download URL.
pub struct HttpDriveSource {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpDriveSource {
    pub fn new(base_url: String, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client for document source")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }
}

#[async_trait]
impl DocumentSource for HttpDriveSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn list_files(&self, folder: &str) -> Result<Vec<SourceFile>> {
        let url = format!("{}/root:/{}:/children", self.base_url, folder);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to list drive folder {}", folder))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "Drive listing failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let payload: serde_json::Value = resp.json().await?;
        Ok(parse_drive_listing(&payload))
    }

    async fn download(&self, file: &SourceFile) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(&file.handle)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", file.name))?;

        if !resp.status().is_success() {
            bail!(
                "Drive download failed (HTTP {}) for '{}'",
                resp.status(),
                file.name
            );
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

/// Parse a drive children listing into [`SourceFile`]s, sorted by name.
/// Folders and entries without a download URL are skipped.
fn parse_drive_listing(payload: &serde_json::Value) -> Vec<SourceFile> {
    let items = payload
        .get("value")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut files = Vec::new();
    for item in items {
        if item.get("folder").is_some() {
            continue;
        }
        let Some(name) = item.get("name").and_then(|v| v.as_str()) else {
            continue;
        };
        let handle = item
            .get("@microsoft.graph.downloadUrl")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if handle.is_empty() {
            tracing::warn!(file = name, "drive entry has no download URL, skipping");
            continue;
        }
        files.push(SourceFile {
            name: name.to_string(),
            last_modified: item
                .get("lastModifiedDateTime")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            size: item.get("size").and_then(|v| v.as_u64()),
            handle: handle.to_string(),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}
