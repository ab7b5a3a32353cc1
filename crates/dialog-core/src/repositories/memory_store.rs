use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use super::session_store::SessionStore;
use crate::domain::{ChatId, Message};
use crate::error::StoreError;

/// Process-local session store.
///
/// Turns are kept in their JSON encoding, exactly as a networked cache would
/// hold them, so decoding rules are exercised here too.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    /// chat_id -> owner label
    owners: Arc<DashMap<ChatId, String>>,
    /// chat_id -> encoded turns, oldest first
    logs: Arc<DashMap<ChatId, VecDeque<String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, chat_id: ChatId) -> Option<String> {
        self.owners.get(&chat_id).map(|entry| entry.value().clone())
    }

    /// Synchronous view of a log, for inspection from non-async code.
    /// Undecodable entries are skipped.
    pub fn snapshot(&self, chat_id: ChatId) -> Vec<Message> {
        self.logs
            .get(&chat_id)
            .map(|log| {
                log.iter()
                    .filter_map(|raw| Message::from_json(raw).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Push an already-encoded entry, bypassing validation.
    pub fn push_raw(&self, chat_id: ChatId, raw: impl Into<String>) {
        self.logs.entry(chat_id).or_default().push_back(raw.into());
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn session_exists(&self, chat_id: ChatId) -> Result<bool, StoreError> {
        Ok(self.owners.contains_key(&chat_id))
    }

    async fn start_session(&self, chat_id: ChatId, owner: &str) -> Result<(), StoreError> {
        self.owners.insert(chat_id, owner.to_string());
        debug!(chat_id, owner, "session registered");
        Ok(())
    }

    async fn end_session(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.owners.remove(&chat_id);
        Ok(())
    }

    async fn append_turn(&self, chat_id: ChatId, message: &Message) -> Result<(), StoreError> {
        let raw = message
            .to_json()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.logs.entry(chat_id).or_default().push_back(raw);
        Ok(())
    }

    async fn pop_oldest_turn(&self, chat_id: ChatId) -> Result<(), StoreError> {
        if let Some(mut log) = self.logs.get_mut(&chat_id) {
            log.pop_front();
        }
        Ok(())
    }

    async fn get_turns(&self, chat_id: ChatId) -> Result<Vec<Message>, StoreError> {
        let Some(log) = self.logs.get(&chat_id) else {
            return Ok(Vec::new());
        };
        log.iter()
            .map(|raw| {
                Message::from_json(raw).map_err(|e| StoreError::Decode {
                    chat_id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn clear_session(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.logs.remove(&chat_id);
        Ok(())
    }

    async fn count_active_sessions(&self) -> Result<usize, StoreError> {
        Ok(self.owners.len())
    }

    async fn list_active_chat_ids(&self) -> Result<Vec<ChatId>, StoreError> {
        Ok(self.owners.iter().map(|entry| *entry.key()).collect())
    }

    async fn turn_count(&self, chat_id: ChatId) -> Result<usize, StoreError> {
        Ok(self.logs.get(&chat_id).map(|log| log.len()).unwrap_or(0))
    }
}
