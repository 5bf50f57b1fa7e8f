use super::prepare_chunks;
use crate::agent::collaborators::SimilarityStore;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::errors::Result;
use crate::ingest::ChunkingConfig;
use crate::metrics;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct StoredChunk {
    source: String,
    index: i32,
    content: String,
    embedding: Vec<f32>,
}

/// In-process similarity store, lost on restart
pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl MemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Self {
        Self {
            embedder,
            chunking,
            chunks: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SimilarityStore for MemoryStore {
    async fn search(&self, query: &str, sources: &[String], top_k: usize) -> Result<Vec<String>> {
        if sources.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let chunks = self.chunks.read().await;

        let mut scored: Vec<(f32, &StoredChunk)> = chunks
            .iter()
            .filter(|c| sources.contains(&c.source))
            .map(|c| (cosine_similarity(&query_embedding, &c.embedding), c))
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.source.cmp(&b.1.source))
                .then_with(|| a.1.index.cmp(&b.1.index))
        });

        debug!(candidates = scored.len(), top_k, "Memory store search");

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, c)| c.content.clone())
            .collect())
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        let chunks = self.chunks.read().await;
        let sources: BTreeSet<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        Ok(sources.into_iter().map(str::to_string).collect())
    }

    async fn ingest(&self, text: &str, source: &str) -> Result<usize> {
        let started = Instant::now();
        let prepared = prepare_chunks(text, &self.chunking)?;

        let contents: Vec<String> = prepared.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&contents).await?;

        let mut chunks = self.chunks.write().await;
        chunks.retain(|c| c.source != source);
        for (chunk, embedding) in prepared.into_iter().zip(embeddings) {
            chunks.push(StoredChunk {
                source: source.to_string(),
                index: chunk.index,
                content: chunk.content,
                embedding,
            });
        }

        let count = contents.len();
        metrics::record_ingestion(started.elapsed().as_secs_f64(), count);
        info!(source, chunks = count, "Document indexed in memory");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    fn store() -> MemoryStore {
        MemoryStore::new(
            Arc::new(HashEmbedder::new(256)),
            ChunkingConfig { chunk_size: 120, min_chunk_size: 10 },
        )
    }

    fn manual() -> String {
        [
            "To reset the router, hold the reset button for ten seconds.",
            "The warranty covers manufacturing defects for two years.",
            "Bananas are rich in potassium and grow in tropical regions.",
        ]
        .join("\n\n")
    }

    #[tokio::test]
    async fn test_search_is_filtered_by_source() {
        let store = store();
        store.ingest(&manual(), "manual.pdf").await.unwrap();
        store.ingest("Reset instructions for a different router model.", "other.pdf").await.unwrap();

        let hits = store
            .search("how do I reset the router", &["manual.pdf".to_string()], 5)
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| !h.contains("different router")));
        assert!(hits[0].contains("reset"));
    }

    #[tokio::test]
    async fn test_list_sources_sorted_unique() {
        let store = store();
        store.ingest(&manual(), "b.pdf").await.unwrap();
        store.ingest(&manual(), "a.pdf").await.unwrap();
        store.ingest(&manual(), "b.pdf").await.unwrap();

        assert_eq!(store.list_sources().await.unwrap(), vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks() {
        let store = store();
        let first = store.ingest(&manual(), "manual.pdf").await.unwrap();
        store.ingest(&manual(), "manual.pdf").await.unwrap();

        let hits = store.search("anything", &["manual.pdf".to_string()], 100).await.unwrap();
        assert_eq!(hits.len(), first);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let store = store();
        tokio_test::assert_err!(store.ingest("   ", "empty.pdf").await);
        assert!(store.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_k_bound() {
        let store = store();
        store.ingest(&manual(), "manual.pdf").await.unwrap();
        let hits = store.search("router", &["manual.pdf".to_string()], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
