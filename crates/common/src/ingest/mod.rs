//! Document preparation: PDF extraction and chunking

pub mod chunker;
pub mod pdf;

pub use chunker::{chunk_text, ChunkingConfig, TextChunk};
pub use pdf::{extract_text, is_pdf};
