//! Similarity stores backing knowledge retrieval
//!
//! - `PgVectorStore`: Postgres with the pgvector extension
//! - `MemoryStore`: in-process, for local development and tests

mod memory;
mod pgvector;

pub use memory::MemoryStore;
pub use pgvector::PgVectorStore;

use crate::agent::collaborators::SimilarityStore;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::ingest::{chunk_text, ChunkingConfig, TextChunk};
use std::sync::Arc;
use tracing::info;

/// Build the store selected by `store.backend`.
///
/// The Postgres backend connects and ensures its schema before returning.
pub async fn build_store(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn SimilarityStore>> {
    let chunking = ChunkingConfig::from(&config.ingestion);

    match config.store.backend.as_str() {
        "postgres" => {
            let pool = DbPool::new(&config.database).await?;
            let store = PgVectorStore::new(pool, embedder, chunking);
            store.ensure_schema().await?;
            info!(backend = "postgres", "Similarity store ready");
            Ok(Arc::new(store))
        }
        "memory" => {
            info!(backend = "memory", "Similarity store ready");
            Ok(Arc::new(MemoryStore::new(embedder, chunking)))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown store backend '{}'", other),
        }),
    }
}

/// Chunk a document for indexing.
///
/// Blank text is rejected. A non-blank document too short to yield a full
/// chunk is kept whole.
pub(crate) fn prepare_chunks(text: &str, chunking: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation {
            message: "Document content cannot be empty.".to_string(),
            field: Some("content".to_string()),
        });
    }

    let chunks = chunk_text(trimmed, chunking);
    if chunks.is_empty() {
        return Ok(vec![TextChunk { content: trimmed.to_string(), index: 0 }]);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_chunks_rejects_blank() {
        let err = prepare_chunks("  \n ", &ChunkingConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_prepare_chunks_keeps_short_documents() {
        let chunks = prepare_chunks(" Warranty: 2 years. ", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Warranty: 2 years.");
    }

    #[tokio::test]
    async fn test_unknown_backend_is_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "qdrant".to_string();
        let embedder = Arc::new(crate::embeddings::HashEmbedder::new(8));
        let result = build_store(&config, embedder).await;
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }
}
