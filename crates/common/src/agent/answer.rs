//! Answer assembly stage - builds the generation prompt from gathered context

use super::collaborators::Generator;
use super::state::WebContext;
use crate::errors::Result;
use std::sync::Arc;
use tracing::{info, instrument};

/// Returned when no document is selected, web search is off and nothing was found
pub const INSUFFICIENT_INFORMATION: &str = "I currently have no documents to refer to and web search \
is turned off, so I don't have enough information to answer this question accurately.";

const KB_LABEL: &str = "Knowledge Base Info";
const WEB_LABEL: &str = "Web Search Results";

const NO_DOCUMENTS_NOTE: &str = "System note: There are currently NO knowledge base documents selected. \
You do NOT have access to any user-provided PDFs or documents. \
If the question asks about 'the document I gave you', 'the PDF I uploaded', or similar, \
you MUST clearly say that you cannot see any document and ask the user to upload/select one. \
Do NOT invent or guess the content of any document.";

const DOCUMENTS_NOTE: &str = "System note: Knowledge base documents are available. \
Any information from those documents will appear in the 'Knowledge Base Info' section inside the context below. \
Do not claim to know things from the documents if they are not present in that section.";

const NO_CONTEXT_PLACEHOLDER: &str =
    "(no external context - rely on general knowledge, but obey the system note above)";

/// Where a context fragment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOrigin {
    KnowledgeBase,
    WebSearch,
}

impl ContextOrigin {
    fn label(&self) -> &'static str {
        match self {
            ContextOrigin::KnowledgeBase => KB_LABEL,
            ContextOrigin::WebSearch => WEB_LABEL,
        }
    }
}

/// Usable fragments, knowledge base first
pub fn fragments<'a>(retrieved: &'a str, web: &'a WebContext) -> Vec<(ContextOrigin, &'a str)> {
    let mut parts = Vec::with_capacity(2);
    if !retrieved.trim().is_empty() {
        parts.push((ContextOrigin::KnowledgeBase, retrieved));
    }
    if let Some(text) = web.content() {
        parts.push((ContextOrigin::WebSearch, text));
    }
    parts
}

/// Build the full generation prompt
pub fn build_prompt(question: &str, retrieved: &str, web: &WebContext, has_documents: bool) -> String {
    let kb_status = if has_documents { DOCUMENTS_NOTE } else { NO_DOCUMENTS_NOTE };

    let context = fragments(retrieved, web)
        .into_iter()
        .map(|(origin, text)| format!("{}:\n{}", origin.label(), text))
        .collect::<Vec<_>>()
        .join("\n\n");
    let context = if context.trim().is_empty() { NO_CONTEXT_PLACEHOLDER.to_string() } else { context };

    format!(
        "You are the final answer generator in a QA system that can use a document knowledge base and web search.\n\n\
         {kb_status}\n\n\
         Question:\n{question}\n\n\
         Context:\n{context}\n\n\
         Instructions:\n\
         - Prefer to base your answer on the context when it is relevant.\n\
         - If the context is empty or clearly unrelated, you may answer from your general knowledge.\n\
         - However, if the question requires reading a specific user-provided document and there are no documents selected, \
         clearly explain that you cannot access any document instead of guessing.\n\
         - Never pretend to have read a document that does not appear in the context."
    )
}

/// How the final answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Generated,
    ShortCircuit,
}

pub struct AnswerAssembly {
    generator: Arc<dyn Generator>,
}

impl AnswerAssembly {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Produce the assistant reply text.
    ///
    /// With no documents, no web access and no context the fixed
    /// insufficient-information text is returned and the generator is not called.
    #[instrument(skip_all, fields(docs = has_documents, web = web_search_enabled))]
    pub async fn assemble(
        &self,
        question: &str,
        retrieved: &str,
        web: &WebContext,
        has_documents: bool,
        web_search_enabled: bool,
    ) -> Result<(String, AnswerSource)> {
        if !has_documents && !web_search_enabled && fragments(retrieved, web).is_empty() {
            info!("No knowledge base, no web access and no context, returning fixed reply");
            return Ok((INSUFFICIENT_INFORMATION.to_string(), AnswerSource::ShortCircuit));
        }

        let prompt = build_prompt(question, retrieved, web, has_documents);
        let answer = self.generator.generate(&prompt).await?;

        info!(answer_len = answer.len(), "Answer generated");
        Ok((answer, AnswerSource::Generated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fakes::ScriptedGenerator;

    #[test]
    fn test_sentinels_are_excluded_from_prompt() {
        for web in [WebContext::Disabled, WebContext::Failed, WebContext::Empty, WebContext::NotSearched] {
            let prompt = build_prompt("q", "", &web, false);
            assert!(!prompt.contains(WEB_LABEL));
            assert!(prompt.contains(NO_CONTEXT_PLACEHOLDER));
        }
    }

    #[test]
    fn test_fragments_are_labeled_in_order() {
        let web = WebContext::Found("Title: t".into());
        let prompt = build_prompt("q", "kb text", &web, true);
        let kb = prompt.find("Knowledge Base Info:\nkb text").unwrap();
        let w = prompt.find("Web Search Results:\nTitle: t").unwrap();
        assert!(kb < w);
        assert!(prompt.contains(DOCUMENTS_NOTE));
    }

    #[test]
    fn test_no_documents_note_forbids_speculation() {
        let prompt = build_prompt("what does my pdf say?", "", &WebContext::Empty, false);
        assert!(prompt.contains("Do NOT invent or guess the content of any document."));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_generator() {
        let generator = Arc::new(ScriptedGenerator::returning("should not be used"));
        let stage = AnswerAssembly::new(generator.clone());

        let (text, source) = stage
            .assemble("q", "", &WebContext::Disabled, false, false)
            .await
            .unwrap();

        assert_eq!(text, INSUFFICIENT_INFORMATION);
        assert_eq!(source, AnswerSource::ShortCircuit);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_generator_output_is_verbatim() {
        let generator = Arc::new(ScriptedGenerator::returning("  The answer.  "));
        let stage = AnswerAssembly::new(generator.clone());

        let (text, source) = stage
            .assemble("q", "", &WebContext::NotSearched, false, true)
            .await
            .unwrap();

        assert_eq!(text, "  The answer.  ");
        assert_eq!(source, AnswerSource::Generated);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_generator_failure_propagates() {
        let stage = AnswerAssembly::new(Arc::new(ScriptedGenerator::failing()));
        let result = stage.assemble("q", "ctx", &WebContext::NotSearched, true, false).await;
        tokio_test::assert_err!(result);
    }
}
