//! Knowledge retrieval stage
//!
//! Looks up the selected documents, then asks the judge whether the matched
//! text is enough to answer. Store failures never leave this stage.

use super::collaborators::SimilarityStore;
use super::judge::SufficiencyJudge;
use super::state::Route;
use crate::errors::Result;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Separator between concatenated chunks
const CHUNK_SEPARATOR: &str = "\n\n";

/// What the stage found and where the turn goes next
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub context: String,
    pub next_route: Route,
    pub chunk_count: usize,
    /// `None` when the judge was not consulted
    pub sufficient: Option<bool>,
}

pub struct KnowledgeRetrieval {
    store: Arc<dyn SimilarityStore>,
    judge: SufficiencyJudge,
    top_k: usize,
}

impl KnowledgeRetrieval {
    pub fn new(store: Arc<dyn SimilarityStore>, judge: SufficiencyJudge, top_k: usize) -> Self {
        Self { store, judge, top_k: top_k.max(1) }
    }

    /// Retrieve context for `question` from `selected_documents`.
    ///
    /// Errors only when the judge itself is unreachable.
    #[instrument(skip(self, question, selected_documents), fields(docs = selected_documents.len()))]
    pub async fn retrieve(
        &self,
        question: &str,
        selected_documents: &[String],
        web_search_enabled: bool,
    ) -> Result<Retrieval> {
        let fallback = if web_search_enabled { Route::Web } else { Route::Answer };

        if selected_documents.is_empty() {
            info!("No documents selected, skipping retrieval");
            return Ok(Retrieval {
                context: String::new(),
                next_route: fallback,
                chunk_count: 0,
                sufficient: None,
            });
        }

        let chunks = match self.store.search(question, selected_documents, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without knowledge-base context");
                Vec::new()
            }
        };

        let chunks: Vec<String> = chunks
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .take(self.top_k)
            .collect();
        let chunk_count = chunks.len();
        let context = chunks.join(CHUNK_SEPARATOR);

        if context.is_empty() {
            info!(next_route = %fallback, "No useful chunks retrieved");
            return Ok(Retrieval { context, next_route: fallback, chunk_count, sufficient: None });
        }

        let sufficient = self.judge.judge(question, &context).await?;
        let next_route = if sufficient { Route::Answer } else { fallback };

        info!(chunks = chunk_count, sufficient, next_route = %next_route, "Retrieval judged");

        Ok(Retrieval { context, next_route, chunk_count, sufficient: Some(sufficient) })
    }
}
