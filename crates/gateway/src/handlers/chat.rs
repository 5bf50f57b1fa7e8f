//! Chat turn handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use askroute_common::{
    agent::{Query, Route, TraceEvent},
    errors::{AppError, Result},
};

/// One user question
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,

    #[validate(length(min = 1, max = 4000))]
    pub query: String,

    #[serde(default = "default_enable_web_search")]
    pub enable_web_search: bool,

    /// Document ids (file names) the knowledge base lookup is restricted to
    #[serde(default)]
    #[validate(length(max = 64))]
    pub selected_files: Vec<String>,
}

fn default_enable_web_search() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub route: Route,
    pub trace_events: Vec<TraceEvent>,
}

/// Run one query turn and record it in the session log
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    if request.query.trim().is_empty() {
        return Err(AppError::Validation {
            message: "query must not be blank".to_string(),
            field: Some("query".to_string()),
        });
    }

    let history = state.sessions.history(&request.session_id).await;
    let prior = history.len();

    let query = Query::new(
        request.session_id,
        request.query,
        request.enable_web_search,
        request.selected_files,
    );

    let mut outcome = state.orchestrator.run(&query, history).await?;

    // Only a completed turn reaches the log
    let new_messages = outcome.conversation.split_off(prior.min(outcome.conversation.len()));
    state.sessions.append(&query.session_id, new_messages).await;

    tracing::info!(
        session_id = %query.session_id,
        route = %outcome.route,
        documents = query.selected_documents().len(),
        web = query.web_search_enabled,
        latency_ms = start.elapsed().as_millis() as u64,
        "Chat turn completed"
    );

    Ok(Json(ChatResponse {
        response: outcome.answer,
        route: outcome.route,
        trace_events: outcome.trace,
    }))
}
