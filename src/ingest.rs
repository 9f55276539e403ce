//! Document ingestion pipeline.
//!
//! Coordinates one sync pass: source listing, filter, download, change
//! detection, local mirror, text extraction, index upsert, then the
//! metadata entry. Per-file failures are logged and counted, never fatal
//! to the run; only a failed listing aborts. The metadata entry is written
//! last, once the document is actually indexed, so a file that failed (or
//! was mirrored while the embedding service was disabled) re-enters the
//! pipeline on the next run.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::embedding::EmbeddingState;
use crate::extract;
use crate::index::VectorIndex;
use crate::metadata::MetadataStore;
use crate::models::{IngestReport, MetadataEntry, SourceFile};
use crate::source::DocumentSource;

/// Extensions the pipeline accepts.
const DOCUMENT_EXTENSIONS: [&str; 2] = [".pdf", ".docx"];

/// Name fragments that mark non-candidate files living in the same folder.
const SKIP_NAME_FRAGMENTS: [&str; 4] = ["website", "policy", "agentmodel", "agentzero"];

/// Run one ingestion pass over the configured source folder.
///
/// The report counts every listed file exactly once: set aside by the
/// filter, skipped as unchanged, fully processed, or failed.
pub async fn run_ingest(
    config: &Config,
    source: &dyn DocumentSource,
    embedding: &EmbeddingState,
    index: &VectorIndex,
) -> Result<IngestReport> {
    let files = source
        .list_files(&config.source.folder)
        .await
        .with_context(|| format!("Failed to list source folder {}", config.source.folder))?;

    tracing::info!(
        source = source.name(),
        folder = config.source.folder.as_str(),
        files = files.len(),
        "source listing complete"
    );

    let mut report = IngestReport {
        listed: files.len(),
        ..IngestReport::default()
    };
    let mut metadata = MetadataStore::load(&config.ingest.metadata_path);

    for file in &files {
        if !is_candidate_document(&file.name) {
            tracing::debug!(file = file.name.as_str(), "set aside by document filter");
            report.filtered += 1;
            continue;
        }

        match ingest_file(config, source, embedding, index, &mut metadata, file).await {
            Ok(FileOutcome::Unchanged) => report.unchanged += 1,
            Ok(FileOutcome::Updated) => report.updated += 1,
            Err(e) => {
                tracing::warn!(file = file.name.as_str(), error = %e, "skipping file");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        listed = report.listed,
        filtered = report.filtered,
        unchanged = report.unchanged,
        updated = report.updated,
        failed = report.failed,
        "ingestion pass complete"
    );
    Ok(report)
}

enum FileOutcome {
    Unchanged,
    Updated,
}

async fn ingest_file(
    config: &Config,
    source: &dyn DocumentSource,
    embedding: &EmbeddingState,
    index: &VectorIndex,
    metadata: &mut MetadataStore,
    file: &SourceFile,
) -> Result<FileOutcome> {
    let bytes = source.download(file).await?;
    let content_hash = hash_bytes(&bytes);

    if !metadata.needs_update(&file.name, &file.last_modified, &content_hash) {
        tracing::debug!(file = file.name.as_str(), "unchanged, skipping");
        return Ok(FileOutcome::Unchanged);
    }

    persist_mirror(&config.ingest.document_dir, &file.name, &bytes)?;

    let provider = match embedding {
        EmbeddingState::Ready(provider) => provider,
        EmbeddingState::Disabled { reason } => {
            tracing::warn!(
                file = file.name.as_str(),
                reason = reason.as_str(),
                "embedding disabled, document mirrored but not indexed"
            );
            return Ok(FileOutcome::Updated);
        }
    };

    let text = extract::extract_text(&file.name, &bytes)?;
    if text.is_empty() {
        anyhow::bail!("extracted text is empty");
    }

    let entry = MetadataEntry {
        last_modified: file.last_modified.clone(),
        file_size: bytes.len() as u64,
        content_hash,
        candidate_name: candidate_name(&file.name),
    };
    let mut index_metadata = serde_json::to_value(&entry)?;
    if let Some(map) = index_metadata.as_object_mut() {
        map.insert(
            "file_name".to_string(),
            serde_json::Value::from(file.name.clone()),
        );
    }
    index
        .upsert(provider.as_ref(), &file.name, &text, &index_metadata)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    metadata.upsert(&file.name, entry)?;
    Ok(FileOutcome::Updated)
}

fn is_candidate_document(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        && !SKIP_NAME_FRAGMENTS.iter().any(|frag| lower.contains(frag))
}

/// Derive a display name from the file name: text before any `{` marker,
/// document extension stripped, surrounding whitespace trimmed. Only known
/// extensions are stripped so dotted names ("J.R. Smith") survive intact.
fn candidate_name(file_name: &str) -> String {
    let stem = file_name.split('{').next().unwrap_or(file_name);
    let lower = stem.to_lowercase();
    let stem = DOCUMENT_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &stem[..stem.len() - ext.len()])
        .unwrap_or(stem);
    stem.trim().to_string()
}

fn persist_mirror(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create document dir {}", dir.display()))?;
    let path = dir.join(file_name);
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
