//! Per-turn data model: the immutable query and the mutable turn record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Next stage selected for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Consult the document knowledge base
    Rag,
    /// Live web search
    Web,
    /// Answer from whatever context exists (or general knowledge)
    Answer,
    /// Conversational reply, no lookup
    End,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Rag => "rag",
            Route::Web => "web",
            Route::Answer => "answer",
            Route::End => "end",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One incoming question with its policy flags. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub session_id: String,
    pub question: String,
    pub web_search_enabled: bool,
    selected_documents: Vec<String>,
}

impl Query {
    /// Build a query; document ids keep their first-seen order and duplicates are dropped
    pub fn new(
        session_id: impl Into<String>,
        question: impl Into<String>,
        web_search_enabled: bool,
        selected_documents: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut docs: Vec<String> = Vec::new();
        for doc in selected_documents {
            if !doc.is_empty() && !docs.contains(&doc) {
                docs.push(doc);
            }
        }

        Self {
            session_id: session_id.into(),
            question: question.into(),
            web_search_enabled,
            selected_documents: docs,
        }
    }

    pub fn selected_documents(&self) -> &[String] {
        &self.selected_documents
    }

    pub fn has_documents(&self) -> bool {
        !self.selected_documents.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Outcome of the web stage.
///
/// `Disabled` and `Failed` are sentinels: they must never be shown to the
/// generator as content, and they are kept apart from a search that simply
/// found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WebContext {
    #[default]
    NotSearched,
    Disabled,
    Failed,
    Empty,
    Found(String),
}

impl WebContext {
    /// Text usable as generation context, if any
    pub fn content(&self) -> Option<&str> {
        match self {
            WebContext::Found(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, WebContext::Disabled | WebContext::Failed)
    }

    /// Short label used in traces
    pub fn label(&self) -> &'static str {
        match self {
            WebContext::NotSearched => "not_searched",
            WebContext::Disabled => "disabled",
            WebContext::Failed => "failed",
            WebContext::Empty => "empty",
            WebContext::Found(_) => "found",
        }
    }
}

/// Mutable record threaded through the stages of one turn
#[derive(Debug, Clone, Default)]
pub struct TurnState {
    conversation: Vec<Message>,
    pub route: Option<Route>,
    pub retrieved_context: String,
    pub web_context: WebContext,
}

impl TurnState {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            conversation: history,
            ..Self::default()
        }
    }

    /// Append-only access to the conversation
    pub fn push(&mut self, message: Message) {
        self.conversation.push(message);
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn into_conversation(self) -> Vec<Message> {
        self.conversation
    }

    /// Most recent assistant message, if the turn produced one
    pub fn final_answer(&self) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_dedupes_documents_in_order() {
        let query = Query::new(
            "s1",
            "q",
            true,
            vec!["b.pdf".to_string(), "a.pdf".to_string(), "b.pdf".to_string(), String::new()],
        );
        assert_eq!(query.selected_documents(), ["b.pdf", "a.pdf"]);
        assert!(query.has_documents());
    }

    #[test]
    fn test_web_context_sentinels_have_no_content() {
        assert_eq!(WebContext::Disabled.content(), None);
        assert_eq!(WebContext::Failed.content(), None);
        assert_eq!(WebContext::Empty.content(), None);
        assert_eq!(WebContext::Found("  ".into()).content(), None);
        assert_eq!(WebContext::Found("Title: x".into()).content(), Some("Title: x"));
        assert!(WebContext::Failed.is_sentinel());
        assert!(!WebContext::Empty.is_sentinel());
    }

    #[test]
    fn test_final_answer_is_last_assistant_message() {
        let mut state = TurnState::new(vec![Message::assistant("old")]);
        state.push(Message::user("hi"));
        assert_eq!(state.final_answer(), Some("old"));
        state.push(Message::assistant("new"));
        assert_eq!(state.final_answer(), Some("new"));
    }

    #[test]
    fn test_route_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Route::Rag).unwrap(), "\"rag\"");
        let route: Route = serde_json::from_str("\"end\"").unwrap();
        assert_eq!(route, Route::End);
    }
}
