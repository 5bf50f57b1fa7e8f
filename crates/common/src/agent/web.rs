//! Web fallback stage

use super::collaborators::{WebResult, WebSearchProvider};
use super::state::{Route, WebContext};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct WebFallback {
    provider: Arc<dyn WebSearchProvider>,
    max_results: usize,
}

impl WebFallback {
    pub fn new(provider: Arc<dyn WebSearchProvider>, max_results: usize) -> Self {
        Self { provider, max_results: max_results.max(1) }
    }

    /// Search the web once. Always hands over to answer assembly; provider
    /// errors come back as the `Failed` sentinel, never as text.
    #[instrument(skip(self, question))]
    pub async fn search(&self, question: &str, web_search_enabled: bool) -> (WebContext, Route) {
        if !web_search_enabled {
            info!("Web search disabled, skipping provider call");
            return (WebContext::Disabled, Route::Answer);
        }

        let context = match self.provider.search(question, self.max_results).await {
            Ok(results) if results.is_empty() => {
                info!("Web search returned no results");
                WebContext::Empty
            }
            Ok(results) => {
                info!(results = results.len(), "Web search completed");
                WebContext::Found(format_results(&results, self.max_results))
            }
            Err(e) => {
                warn!(error = %e, "Web search failed, excluding it from the answer context");
                WebContext::Failed
            }
        };

        (context, Route::Answer)
    }
}

/// Render results as `Title/Content/URL` blocks separated by blank lines
pub fn format_results(results: &[WebResult], limit: usize) -> String {
    results
        .iter()
        .take(limit)
        .map(|r| format!("Title: {}\nContent: {}\nURL: {}", r.title, r.content, r.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}
