//! askroute Common Library
//!
//! Shared code for the askroute services:
//! - Query-routing core (router, retrieval with sufficiency judge, web fallback, answer assembly)
//! - LLM, web search and embedding provider clients
//! - Similarity stores (pgvector, in-memory)
//! - Document extraction and chunking
//! - Error types, configuration and metrics

pub mod agent;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod store;
pub mod websearch;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
