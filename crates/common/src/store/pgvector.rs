use super::prepare_chunks;
use crate::agent::collaborators::SimilarityStore;
use crate::db::DbPool;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::ingest::ChunkingConfig;
use crate::metrics;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, Statement, TransactionTrait};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Postgres + pgvector similarity store.
///
/// Vectors are bound as text literals and cast with `::vector` in SQL.
pub struct PgVectorStore {
    pool: DbPool,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
}

impl PgVectorStore {
    pub fn new(pool: DbPool, embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Self {
        Self { pool, embedder, chunking }
    }

    /// Create the extension, table and source index if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = self.pool.conn();
        let dimension = self.embedder.dimension();

        conn.execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector").await?;
        conn.execute_unprepared(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id UUID PRIMARY KEY,
                source TEXT NOT NULL,
                chunk_index INT NOT NULL,
                content TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            dimension
        ))
        .await?;
        conn.execute_unprepared("CREATE INDEX IF NOT EXISTS chunks_source_idx ON chunks (source)")
            .await?;

        info!(dimension, "Chunk schema ensured");
        Ok(())
    }
}

/// pgvector text format: "[1.0,2.0,...]"
pub(crate) fn to_pgvector(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(",")
    )
}

#[async_trait]
impl SimilarityStore for PgVectorStore {
    async fn search(&self, query: &str, sources: &[String], top_k: usize) -> Result<Vec<String>> {
        if sources.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT content
            FROM chunks
            WHERE source = ANY($2)
            ORDER BY embedding <=> $1::vector
            LIMIT $3
            "#,
            vec![
                to_pgvector(&embedding).into(),
                sources.to_vec().into(),
                (top_k as i64).into(),
            ],
        );

        let rows = self
            .pool
            .conn()
            .query_all(stmt)
            .await
            .map_err(|e| AppError::Retrieval { message: format!("Vector search failed: {}", e) })?;

        let chunks: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.try_get_by_index::<String>(0).ok())
            .collect();

        debug!(results = chunks.len(), top_k, "Vector search complete");
        Ok(chunks)
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            "SELECT DISTINCT source FROM chunks ORDER BY source",
        );

        let rows = self.pool.conn().query_all(stmt).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get_by_index::<String>(0).ok())
            .collect())
    }

    async fn ingest(&self, text: &str, source: &str) -> Result<usize> {
        let started = Instant::now();
        let prepared = prepare_chunks(text, &self.chunking)?;

        let contents: Vec<String> = prepared.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&contents).await?;
        if embeddings.len() != prepared.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Expected {} embeddings, got {}",
                    prepared.len(),
                    embeddings.len()
                ),
            });
        }

        // Re-ingesting a source replaces its previous chunks
        let txn = self.pool.conn().begin().await?;
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM chunks WHERE source = $1",
            vec![source.into()],
        ))
        .await?;

        for (chunk, embedding) in prepared.into_iter().zip(embeddings) {
            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO chunks (id, source, chunk_index, content, embedding, created_at)
                VALUES ($1, $2, $3, $4, $5::vector, NOW())
                "#,
                vec![
                    Uuid::new_v4().into(),
                    source.into(),
                    chunk.index.into(),
                    chunk.content.into(),
                    to_pgvector(&embedding).into(),
                ],
            );
            txn.execute(stmt).await?;
        }
        txn.commit().await?;

        let count = contents.len();
        metrics::record_ingestion(started.elapsed().as_secs_f64(), count);
        info!(source, chunks = count, "Document indexed");
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}
