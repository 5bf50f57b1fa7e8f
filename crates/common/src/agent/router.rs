//! Intent router - picks the information source for a question
//!
//! The classifier is told which routes are currently usable, but its answer is
//! never trusted on policy: a `web` route with web search disabled is always
//! corrected afterwards.

use super::collaborators::{Classifier, RouteDecision};
use super::state::Route;
use crate::errors::Result;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Reply used when the classifier picks `end` without providing one
pub const DEFAULT_REPLY: &str = "Hello!";

const ROUTER_PROMPT: &str = r#"You are a routing controller in a QA system. Your job is to decide which information source the agent should use next for the user's query.

Available routes:
- "rag": Query the internal knowledge base / vector store.
- "web": Use real-time web search (only when web search is enabled).
- "answer": Answer directly from your own general knowledge, without using any external tool.
- "end": For pure greetings or small-talk where no factual answer is needed. When you choose "end", you MUST also provide a short friendly reply in the "reply" field.

General routing strategy:
- For most factual, explanatory, or procedural questions, prefer "rag" and let the system try the internal knowledge base first.
- Web search is mainly a fallback: if information from the knowledge base is insufficient, the system may then use web search on its own.
- You MAY route directly to "web" only when the question clearly depends on very time-sensitive, live, or very recent information that a static knowledge base is unlikely to contain (e.g. today's news, current weather, live sports scores, stock prices).
- Use "answer" only for very simple questions that do not need any lookup (e.g. "What is your name?", "What can you do?").
- Use "end" only for greetings or small-talk where the user is not asking for information.

If you are unsure between "rag" and "web", choose "rag".

Respond ONLY with a JSON object of the form:
{"route": "rag" | "web" | "answer" | "end", "reply": string | null}"#;

const WEB_ENABLED_NOTE: &str = "Web search status: ENABLED.";

const WEB_DISABLED_NOTE: &str = "Web search status: DISABLED. You MUST NOT route to \"web\".";

const NO_DOCUMENTS_NOTE: &str = r#"Knowledge base status: NO documents are selected.
You do NOT have access to any user-provided PDFs or documents.
If the user asks about "the document I gave you", "the PDF I uploaded", or similar:
- Do NOT route to "web" just to guess the content of their document.
- Prefer the "answer" route and explain that no documents are selected, so you cannot see their file."#;

const DOCUMENTS_NOTE: &str = r#"Knowledge base status: Some documents ARE selected.
If the user asks about the content of their documents/PDFs, choose the "rag" route (not "web")."#;

/// Resolved routing decision
#[derive(Debug, Clone, PartialEq)]
pub struct Routing {
    pub route: Route,
    /// Terminal reply, present only when `route == End`
    pub reply: Option<String>,
    /// Route the classifier asked for before policy was applied
    pub classified: Route,
}

impl Routing {
    pub fn was_overridden(&self) -> bool {
        self.route != self.classified
    }
}

/// Intent router
pub struct IntentRouter {
    classifier: Arc<dyn Classifier>,
}

impl IntentRouter {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Build the classifier instructions for the current policy flags
    pub fn instructions(web_search_enabled: bool, has_documents: bool) -> String {
        let web_note = if web_search_enabled { WEB_ENABLED_NOTE } else { WEB_DISABLED_NOTE };
        let kb_note = if has_documents { DOCUMENTS_NOTE } else { NO_DOCUMENTS_NOTE };

        format!("{}\n\n{}\n\n{}", ROUTER_PROMPT, web_note, kb_note)
    }

    /// Classify a question and resolve the route under policy.
    ///
    /// A classifier failure is returned as-is; no substitute route is guessed.
    #[instrument(skip(self, question), fields(web = web_search_enabled, docs = has_documents))]
    pub async fn route(
        &self,
        question: &str,
        web_search_enabled: bool,
        has_documents: bool,
    ) -> Result<Routing> {
        let instructions = Self::instructions(web_search_enabled, has_documents);
        let decision = self.classifier.classify(&instructions, question).await?;

        let routing = resolve(decision, web_search_enabled, has_documents);

        if routing.was_overridden() {
            warn!(
                classified = %routing.classified,
                resolved = %routing.route,
                "Classifier picked a disabled route, overriding"
            );
        }
        info!(route = %routing.route, "Router decision");

        Ok(routing)
    }
}

/// Apply the post-classification policy to a raw decision
pub fn resolve(decision: RouteDecision, web_search_enabled: bool, has_documents: bool) -> Routing {
    let classified = decision.route;

    let route = match classified {
        Route::Web if !web_search_enabled => {
            if has_documents { Route::Rag } else { Route::Answer }
        }
        other => other,
    };

    let reply = (route == Route::End).then(|| {
        decision
            .reply
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REPLY.to_string())
    });

    Routing { route, reply, classified }
}
