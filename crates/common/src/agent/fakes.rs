//! Deterministic collaborators for tests (`test-util` feature)
//!
//! Every fake counts its calls so tests can assert which external services a
//! turn touched.

use super::collaborators::{
    Classifier, Generator, Judge, RouteDecision, SimilarityStore, Verdict, WebResult,
    WebSearchProvider,
};
use super::state::Route;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn record(slot: &Mutex<Option<String>>, value: &str) {
    if let Ok(mut guard) = slot.lock() {
        *guard = Some(value.to_string());
    }
}

fn recorded(slot: &Mutex<Option<String>>) -> Option<String> {
    slot.lock().ok().and_then(|guard| guard.clone())
}

/// Classifier returning a fixed decision
pub struct ScriptedClassifier {
    outcome: std::result::Result<RouteDecision, String>,
    calls: AtomicUsize,
    last_instructions: Mutex<Option<String>>,
}

impl ScriptedClassifier {
    pub fn returning(route: Route, reply: Option<&str>) -> Self {
        Self {
            outcome: Ok(RouteDecision { route, reply: reply.map(str::to_string) }),
            calls: AtomicUsize::new(0),
            last_instructions: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err("classifier offline".to_string()),
            calls: AtomicUsize::new(0),
            last_instructions: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_instructions(&self) -> Option<String> {
        recorded(&self.last_instructions)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, instructions: &str, _question: &str) -> Result<RouteDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        record(&self.last_instructions, instructions);
        self.outcome
            .clone()
            .map_err(|message| AppError::provider("classifier", message))
    }
}

#[derive(Debug, Clone, Copy)]
enum JudgeBehavior {
    Verdict(bool),
    Malformed,
    Unavailable,
}

/// Judge with a configured verdict
pub struct ScriptedJudge {
    behavior: JudgeBehavior,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn returning(sufficient: bool) -> Self {
        Self { behavior: JudgeBehavior::Verdict(sufficient), calls: AtomicUsize::new(0) }
    }

    pub fn malformed() -> Self {
        Self { behavior: JudgeBehavior::Malformed, calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { behavior: JudgeBehavior::Unavailable, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn judge(&self, _instructions: &str, _question: &str, _retrieved: &str) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            JudgeBehavior::Verdict(sufficient) => Ok(Verdict { sufficient }),
            JudgeBehavior::Malformed => Err(AppError::malformed("judge", "not json")),
            JudgeBehavior::Unavailable => Err(AppError::provider("judge", "judge offline")),
        }
    }
}

/// Generator that answers with a fixed text
pub struct ScriptedGenerator {
    answer: Option<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedGenerator {
    pub fn returning(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self { answer: None, calls: AtomicUsize::new(0), last_prompt: Mutex::new(None) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        recorded(&self.last_prompt)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        record(&self.last_prompt, prompt);
        self.answer
            .clone()
            .ok_or_else(|| AppError::provider("generator", "generator offline"))
    }
}

/// Store serving a fixed chunk list regardless of the query
pub struct ScriptedStore {
    chunks: Option<Vec<String>>,
    sources: Vec<String>,
    searches: AtomicUsize,
    last_sources: Mutex<Option<String>>,
}

impl ScriptedStore {
    pub fn with_chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: Some(chunks.iter().map(|c| c.to_string()).collect()),
            sources: Vec::new(),
            searches: AtomicUsize::new(0),
            last_sources: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            chunks: None,
            sources: Vec::new(),
            searches: AtomicUsize::new(0),
            last_sources: Mutex::new(None),
        }
    }

    pub fn with_sources(mut self, sources: &[&str]) -> Self {
        self.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Comma-joined source filter of the last search
    pub fn last_sources(&self) -> Option<String> {
        recorded(&self.last_sources)
    }
}

#[async_trait]
impl SimilarityStore for ScriptedStore {
    async fn search(&self, _query: &str, sources: &[String], top_k: usize) -> Result<Vec<String>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        record(&self.last_sources, &sources.join(","));
        match &self.chunks {
            Some(chunks) => Ok(chunks.iter().take(top_k).cloned().collect()),
            None => Err(AppError::Retrieval { message: "store offline".to_string() }),
        }
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        Ok(self.sources.clone())
    }

    async fn ingest(&self, text: &str, _source: &str) -> Result<usize> {
        if text.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Document content cannot be empty.".to_string(),
                field: None,
            });
        }
        Ok(1)
    }
}

/// Web search provider with canned results
pub struct ScriptedSearch {
    results: Option<Vec<WebResult>>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn returning(results: Vec<WebResult>) -> Self {
        Self { results: Some(results), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { results: None, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearchProvider for ScriptedSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.results {
            Some(results) => Ok(results.iter().take(max_results).cloned().collect()),
            None => Err(AppError::SearchProvider {
                message: "upstream 502: quota exhausted".to_string(),
            }),
        }
    }
}
