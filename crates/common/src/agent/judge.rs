//! Sufficiency judge for retrieved knowledge-base text

use super::collaborators::Judge;
use crate::errors::{AppError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

const JUDGE_PROMPT: &str = r#"You are a judge evaluating whether the retrieved text is sufficient and relevant to fully answer the user's question.

Criteria for sufficiency:
- The retrieved text directly addresses the main question.
- It contains enough detail for a clear and accurate answer.
- It is specific and relevant, not just vague background.

NOT sufficient if:
- It is vague, generic, or only partially related.
- It does not clearly answer the user's main question.
- It is obviously incomplete or missing key details.
- There was effectively no useful retrieval (e.g. "No results found").

Respond ONLY with a JSON object of the form:
{"sufficient": true}  or  {"sufficient": false}

Examples:
- Question: "What is the capital of France?"
  Retrieved: "Paris is the capital of France."
  -> {"sufficient": true}

- Question: "What are the symptoms of diabetes?"
  Retrieved: "Diabetes is a chronic condition."
  -> {"sufficient": false}  (does not list symptoms)

- Question: "How to fix error X in software Y?"
  Retrieved: "No relevant information found."
  -> {"sufficient": false}"#;

/// Wraps the judge collaborator with the insufficiency default
pub struct SufficiencyJudge {
    judge: Arc<dyn Judge>,
}

impl SufficiencyJudge {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    pub fn instructions() -> &'static str {
        JUDGE_PROMPT
    }

    /// Single judgement call.
    ///
    /// An undecodable verdict counts as insufficient; an unreachable judge is
    /// an error.
    pub async fn judge(&self, question: &str, context: &str) -> Result<bool> {
        match self.judge.judge(JUDGE_PROMPT, question, context).await {
            Ok(verdict) => {
                debug!(sufficient = verdict.sufficient, "Judge verdict");
                Ok(verdict.sufficient)
            }
            Err(AppError::MalformedResponse { provider, message }) => {
                warn!(%provider, error = %message, "Unparseable judge verdict, treating as insufficient");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
