//! Capability traits for the external services the routing core delegates to
//!
//! Each trait is deliberately narrow so the routing, judging and assembly
//! logic can be exercised with deterministic fakes.

use super::state::Route;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub route: Route,
    /// Short friendly reply, expected when `route == End`
    #[serde(default)]
    pub reply: Option<String>,
}

/// Structured judge output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub sufficient: bool,
}

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub content: String,
    pub url: String,
}

/// Route classification
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, instructions: &str, question: &str) -> Result<RouteDecision>;
}

/// Context sufficiency judgement
#[async_trait]
pub trait Judge: Send + Sync {
    /// Returns `AppError::MalformedResponse` when the reply cannot be decoded
    async fn judge(&self, instructions: &str, question: &str, retrieved: &str) -> Result<Verdict>;
}

/// Single-shot answer generation; the full prompt is supplied every call
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Document similarity store
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Top `top_k` chunk texts restricted to `sources`, best match first
    async fn search(&self, query: &str, sources: &[String], top_k: usize) -> Result<Vec<String>>;

    /// Every source id that has at least one chunk, sorted
    async fn list_sources(&self) -> Result<Vec<String>>;

    /// Chunk and index `text` under `source`; returns the number of chunks created
    async fn ingest(&self, text: &str, source: &str) -> Result<usize>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Live web search
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>>;
}
