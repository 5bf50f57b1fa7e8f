//! Per-turn stage trace returned to API callers
//!
//! Purely observational: nothing in the routing logic reads it back.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Maximum characters of stage output kept in a trace summary
pub const SUMMARY_CHARS: usize = 100;

/// One stage execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub step: u32,
    pub node_name: String,
    pub description: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub event_type: String,
}

/// Ordered trace builder
#[derive(Debug, Default)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node_name: &str, description: String, details: Value) {
        let details = match details {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        self.events.push(TraceEvent {
            step: self.events.len() as u32 + 1,
            node_name: node_name.to_string(),
            description,
            details,
            event_type: "node".to_string(),
        });
    }

    pub fn router(&mut self, route: &str, overridden_from: Option<&str>) {
        let mut details = json!({ "decision": route });
        if let Some(original) = overridden_from {
            details["overridden_from"] = json!(original);
        }
        self.push("router", format!("Router -> {}", route), details);
    }

    pub fn retrieval(&mut self, context: &str, chunks: usize, sufficient: Option<bool>) {
        self.push(
            "rag_lookup",
            "RAG Check".to_string(),
            json!({ "summary": summarize(context), "chunks": chunks, "sufficient": sufficient }),
        );
    }

    pub fn web(&mut self, outcome: &str, context: Option<&str>) {
        self.push(
            "web_search",
            "Web Search".to_string(),
            json!({ "summary": summarize(context.unwrap_or_default()), "outcome": outcome }),
        );
    }

    pub fn answer(&mut self, short_circuit: bool) {
        self.push("answer", "Answer".to_string(), json!({ "short_circuit": short_circuit }));
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

/// First `SUMMARY_CHARS` characters, never splitting a code point
pub fn summarize(text: &str) -> String {
    text.chars().take(SUMMARY_CHARS).collect()
}
