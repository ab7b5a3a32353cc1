//! Session store trait (port)

use async_trait::async_trait;

use crate::domain::{ChatId, Message};
use crate::error::StoreError;

/// Durable per-chat state: an existence flag with the owner label, and an
/// append-only turn log that is only ever truncated from the head.
///
/// Each call is atomic on its own; nothing is promised across calls.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn session_exists(&self, chat_id: ChatId) -> Result<bool, StoreError>;

    /// Marks the chat as active. Overwrites the owner if already set.
    async fn start_session(&self, chat_id: ChatId, owner: &str) -> Result<(), StoreError>;

    /// Unsets the existence flag. No-op for unknown chats.
    async fn end_session(&self, chat_id: ChatId) -> Result<(), StoreError>;

    async fn append_turn(&self, chat_id: ChatId, message: &Message) -> Result<(), StoreError>;

    /// Drops exactly one turn from the head; no-op on an empty log.
    async fn pop_oldest_turn(&self, chat_id: ChatId) -> Result<(), StoreError>;

    /// Full log, oldest first.
    async fn get_turns(&self, chat_id: ChatId) -> Result<Vec<Message>, StoreError>;

    /// Deletes the whole log. No-op for unknown chats.
    async fn clear_session(&self, chat_id: ChatId) -> Result<(), StoreError>;

    // Read-only accessors for telemetry

    async fn count_active_sessions(&self) -> Result<usize, StoreError>;

    async fn list_active_chat_ids(&self) -> Result<Vec<ChatId>, StoreError>;

    async fn turn_count(&self, chat_id: ChatId) -> Result<usize, StoreError>;
}
