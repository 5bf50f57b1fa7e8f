//! Session log handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::AppState;
use askroute_common::{
    agent::Message,
    errors::{AppError, Result},
};

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Conversation recorded for a session
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>> {
    let messages = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| AppError::SessionNotFound {
            id: session_id.clone(),
        })?;

    Ok(Json(SessionResponse {
        session_id,
        messages,
    }))
}
