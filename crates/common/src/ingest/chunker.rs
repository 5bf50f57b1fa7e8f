//! Text chunking
//!
//! Splits document text into chunks for embedding.

use crate::config::IngestionConfig;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Chunks shorter than this are dropped
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            min_chunk_size: 50,
        }
    }
}

impl From<&IngestionConfig> for ChunkingConfig {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            min_chunk_size: config.min_chunk_size,
        }
    }
}

/// A text chunk with its position in the document
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub index: i32,
}

/// Split text into chunks, dropping fragments below `min_chunk_size`.
/// Indexes are contiguous after filtering.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let splitter = TextSplitter::new(ChunkConfig::new(config.chunk_size.max(1)));

    let chunks: Vec<TextChunk> = splitter
        .chunks(text)
        .map(str::trim)
        .filter(|chunk| chunk.chars().count() >= config.min_chunk_size)
        .enumerate()
        .map(|(index, content)| TextChunk {
            content: content.to_string(),
            index: index as i32,
        })
        .collect();

    debug!(
        input_len = text.len(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    chunks
}
