//! File-backed ingestion metadata.
//!
//! One JSON map from source file name to its last-seen modification stamp,
//! size, content hash, and derived candidate name. The map decides which
//! files re-enter the pipeline on the next ingestion run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::MetadataEntry;

pub struct MetadataStore {
    path: PathBuf,
    entries: BTreeMap<String, MetadataEntry>,
}

impl MetadataStore {
    /// Load existing metadata, or start empty when the file is missing.
    /// A corrupt file is logged and treated as empty rather than aborting
    /// ingestion.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "metadata file is corrupt, starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn get(&self, file_name: &str) -> Option<&MetadataEntry> {
        self.entries.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A file needs ingestion when it is unknown, its modification stamp
    /// moved, or its content hash changed.
    pub fn needs_update(&self, file_name: &str, last_modified: &str, content_hash: &str) -> bool {
        match self.entries.get(file_name) {
            None => true,
            Some(entry) => {
                entry.last_modified != last_modified || entry.content_hash != content_hash
            }
        }
    }

    /// Insert or replace an entry and persist the whole map.
    pub fn upsert(&mut self, file_name: &str, entry: MetadataEntry) -> Result<()> {
        self.entries.insert(file_name.to_string(), entry);
        self.save()
    }

    /// Persist atomically: write a sibling temp file, then rename it over
    /// the live one so a crash mid-write never leaves a torn map behind.
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
