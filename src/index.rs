//! Content-addressed vector index.
//!
//! Each record is keyed by document id and carries the SHA-256 of its
//! (bounded) text. Upserting an unchanged document is a no-op that never
//! calls the embedding service; the hash comparison alone decides. Queries
//! embed the query text, scan the whole collection, and rank by cosine
//! similarity clamped to `[0, 1]`.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::path::PathBuf;

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Connection, Row as _, SqliteConnection};

use crate::config::IndexConfig;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, EmbeddingProvider};
use crate::error::EngineError;

/// One ranked hit from [`VectorIndex::query`].
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub document: String,
    pub similarity: f64,
    pub metadata: serde_json::Value,
}

pub struct VectorIndex {
    path: PathBuf,
    max_document_tokens: usize,
    chars_per_token: usize,
}

impl VectorIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            path: config.path.clone(),
            max_document_tokens: config.max_document_tokens,
            chars_per_token: config.chars_per_token,
        }
    }

    /// Insert or refresh one document. Returns `true` when the index row
    /// was written, `false` when the stored hash already matched.
    pub async fn upsert(
        &self,
        embedding: &dyn EmbeddingProvider,
        id: &str,
        content: &str,
        metadata: &serde_json::Value,
    ) -> Result<bool, EngineError> {
        let content = self.bounded_content(id, content);
        let content_hash = hash_content(&content);

        let mut conn = db::connect_index(&self.path).await?;
        let outcome = self
            .upsert_inner(&mut conn, embedding, id, &content, &content_hash, metadata)
            .await;
        let _ = conn.close().await;
        outcome
    }

    async fn upsert_inner(
        &self,
        conn: &mut SqliteConnection,
        embedding: &dyn EmbeddingProvider,
        id: &str,
        content: &str,
        content_hash: &str,
        metadata: &serde_json::Value,
    ) -> Result<bool, EngineError> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM vector_records WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        if existing.as_deref() == Some(content_hash) {
            tracing::debug!(id, "document unchanged, skipping embed");
            return Ok(false);
        }

        let vectors = embedding.embed_texts(&[content.to_string()]).await?;
        let vector = vectors.into_iter().next().ok_or_else(|| {
            EngineError::Other(anyhow::anyhow!("Embedding response contained no vectors"))
        })?;

        sqlx::query(
            "INSERT INTO vector_records (id, content_hash, document, embedding, metadata, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 document = excluded.document,
                 embedding = excluded.embedding,
                 metadata = excluded.metadata,
                 updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(content_hash)
        .bind(content)
        .bind(vec_to_blob(&vector))
        .bind(metadata.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;

        tracing::info!(id, "document indexed");
        Ok(true)
    }

    /// Rank every indexed document against the query text.
    pub async fn query(
        &self,
        embedding: &dyn EmbeddingProvider,
        query: &str,
        limit: usize,
    ) -> Result<Vec<IndexMatch>, EngineError> {
        let query_vector = embed_query(embedding, query).await?;

        let mut conn = db::connect_index(&self.path).await?;
        let outcome = scan_records(&mut conn, &query_vector, limit).await;
        let _ = conn.close().await;
        outcome
    }

    /// Enforce the token budget by character count, cutting on a char
    /// boundary. The hash is computed over the bounded text, so a document
    /// that only changes past the cut is treated as unchanged.
    fn bounded_content<'a>(&self, id: &str, content: &'a str) -> Cow<'a, str> {
        let char_count = content.chars().count();
        let token_estimate = char_count / self.chars_per_token;
        if token_estimate <= self.max_document_tokens {
            return Cow::Borrowed(content);
        }

        let max_chars = self.max_document_tokens * self.chars_per_token;
        tracing::warn!(
            id,
            tokens = token_estimate,
            limit = self.max_document_tokens,
            "document exceeds token budget, truncating"
        );
        let cut = content
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(content.len());
        Cow::Borrowed(&content[..cut])
    }
}

async fn scan_records(
    conn: &mut SqliteConnection,
    query_vector: &[f32],
    limit: usize,
) -> Result<Vec<IndexMatch>, EngineError> {
    let rows = sqlx::query("SELECT id, document, embedding, metadata FROM vector_records")
        .fetch_all(&mut *conn)
        .await?;

    let mut matches = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.try_get("id")?;
        let document: String = row.try_get("document")?;
        let blob: Vec<u8> = row.try_get("embedding")?;
        let metadata_raw: String = row.try_get("metadata")?;

        let vector = blob_to_vec(&blob);
        let similarity = f64::from(cosine_similarity(query_vector, &vector)).clamp(0.0, 1.0);
        let metadata = serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null);

        matches.push(IndexMatch {
            id,
            document,
            similarity,
            metadata,
        });
    }

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches.truncate(limit);
    Ok(matches)
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
