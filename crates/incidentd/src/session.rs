//! Conversation state store.
//!
//! Sessions are keyed by an opaque id and live for the lifetime of the
//! process. Each session sits behind its own async mutex: a turn holds the
//! lock from first read to final write-back, so concurrent requests on one
//! key queue up instead of interleaving history mutations.

use chrono::{DateTime, Utc};
use incident_common::ChatMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum number of messages kept per session
pub const HISTORY_WINDOW: usize = 10;

/// History reducer: append `new` to `existing`, keeping only the most
/// recent `HISTORY_WINDOW` messages in insertion order.
pub fn trim_history(
    mut existing: Vec<ChatMessage>,
    new: impl IntoIterator<Item = ChatMessage>,
) -> Vec<ChatMessage> {
    existing.extend(new);
    if existing.len() > HISTORY_WINDOW {
        let overflow = existing.len() - HISTORY_WINDOW;
        existing.drain(..overflow);
    }
    existing
}

/// One user's multi-turn conversation
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    history: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    turns: u64,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            history: Vec::new(),
            created_at: Utc::now(),
            turns: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Completed turns
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Ordered history, oldest first
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Append messages, applying the window trim
    pub fn append(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        let existing = std::mem::take(&mut self.history);
        self.history = trim_history(existing, messages);
    }

    /// Replace history with the result of a completed turn
    pub fn commit_turn(&mut self, history: Vec<ChatMessage>) {
        self.history = trim_history(Vec::new(), history);
        self.turns += 1;
    }
}

/// Shared handle to a session; lock it for the duration of a turn
pub type SessionHandle = Arc<Mutex<Session>>;

/// Process-wide session registry
#[derive(Default)]
pub struct ConversationStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume the session for `key`, creating it if unknown. Without a key
    /// (or with a blank one) a fresh id is minted; the id is returned so the
    /// caller can resume later.
    pub async fn get_or_create(&self, key: Option<&str>) -> (String, SessionHandle) {
        let key = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => k.to_string(),
            None => {
                let minted = Uuid::new_v4().to_string();
                info!("Starting new conversation with session_id: {}", minted);
                minted
            }
        };

        if let Some(handle) = self.sessions.read().await.get(&key) {
            debug!("Continuing conversation with session_id: {}", key);
            return (key, handle.clone());
        }

        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(key.clone()))))
            .clone();
        (key, handle)
    }

    /// Existing session for `key`, if any
    pub async fn get(&self, key: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Append messages to a session (created on demand)
    pub async fn append(&self, key: &str, messages: Vec<ChatMessage>) {
        let (_, handle) = self.get_or_create(Some(key)).await;
        handle.lock().await.append(messages);
    }

    /// Snapshot of a session's history; unknown sessions have none
    pub async fn get_history(&self, key: &str) -> Vec<ChatMessage> {
        match self.get(key).await {
            Some(handle) => handle.lock().await.history().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
