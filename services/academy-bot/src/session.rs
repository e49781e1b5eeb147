//! Per-user conversation mode
//!
//! In-memory only; a restart drops every session back to the menu.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Free text from this user goes to the completion client
    AiChat,
}

/// User id -> mode. Users without an entry are on the menu.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<i64, SessionMode>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enter_ai_chat(&self, user_id: i64) {
        self.sessions
            .write()
            .await
            .insert(user_id, SessionMode::AiChat);
    }

    /// Drop the user's session. Returns whether one existed.
    pub async fn clear(&self, user_id: i64) -> bool {
        self.sessions.write().await.remove(&user_id).is_some()
    }

    pub async fn mode(&self, user_id: i64) -> Option<SessionMode> {
        self.sessions.read().await.get(&user_id).copied()
    }

    pub async fn is_ai_chat(&self, user_id: i64) -> bool {
        self.mode(user_id).await == Some(SessionMode::AiChat)
    }
}
