//! In-process conversation log, keyed by session id. Lost on restart.
//!
//! Bounded on both axes: each session keeps its newest `max_messages`, and
//! once `max_sessions` ids are held the least recently updated one is evicted.

use askroute_common::agent::Message;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

struct Session {
    messages: Vec<Message>,
    last_updated: u64,
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, Session>,
    clock: u64,
}

pub struct SessionLog {
    inner: RwLock<Sessions>,
    max_sessions: usize,
    max_messages: usize,
}

impl SessionLog {
    pub fn new(max_sessions: usize, max_messages: usize) -> Self {
        Self {
            inner: RwLock::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
            max_messages: max_messages.max(1),
        }
    }

    /// Prior messages of a session, empty for an unknown id
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        self.get(session_id).await.unwrap_or_default()
    }

    /// `None` when the session has never completed a turn (or was evicted)
    pub async fn get(&self, session_id: &str) -> Option<Vec<Message>> {
        self.inner
            .read()
            .await
            .by_id
            .get(session_id)
            .map(|s| s.messages.clone())
    }

    pub async fn append(&self, session_id: &str, messages: Vec<Message>) {
        let mut inner = self.inner.write().await;
        inner.clock += 1;
        let now = inner.clock;

        if !inner.by_id.contains_key(session_id) && inner.by_id.len() >= self.max_sessions {
            let oldest = inner
                .by_id
                .iter()
                .min_by_key(|(_, s)| s.last_updated)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                debug!(session_id = %id, "Evicting least recently updated session");
                inner.by_id.remove(&id);
            }
        }

        let session = inner
            .by_id
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                messages: Vec::new(),
                last_updated: now,
            });
        session.last_updated = now;
        session.messages.extend(messages);

        let excess = session.messages.len().saturating_sub(self.max_messages);
        if excess > 0 {
            session.messages.drain(..excess);
        }
    }
}
