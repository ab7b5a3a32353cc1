//! Session store backed by Redis
//!
//! Layout:
//! - hash `active_chats_users`: chat_id -> owner label (existence flag)
//! - list `conversation:{chat_id}`: JSON-encoded turns, oldest at the head

use async_trait::async_trait;
use deadpool_redis::redis::{self, FromRedisValue};
use deadpool_redis::{Connection, Pool};
use tracing::{debug, warn};

use dialog_core::{ChatId, Message, SessionStore, StoreError};

pub const ACTIVE_CHATS_KEY: &str = "active_chats_users";
const CONVERSATION_PREFIX: &str = "conversation:";

#[derive(Clone)]
pub struct RedisSessionStore {
    pool: Pool,
}

impl RedisSessionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn conversation_key(chat_id: ChatId) -> String {
        format!("{}{}", CONVERSATION_PREFIX, chat_id)
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        let mut conn = self.conn().await?;
        cmd.query_async::<T>(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn session_exists(&self, chat_id: ChatId) -> Result<bool, StoreError> {
        self.query(redis::cmd("HEXISTS").arg(ACTIVE_CHATS_KEY).arg(chat_id))
            .await
    }

    async fn start_session(&self, chat_id: ChatId, owner: &str) -> Result<(), StoreError> {
        self.query::<()>(
            redis::cmd("HSET")
                .arg(ACTIVE_CHATS_KEY)
                .arg(chat_id)
                .arg(owner),
        )
        .await?;
        debug!(chat_id, owner, "session registered in redis");
        Ok(())
    }

    async fn end_session(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.query(redis::cmd("HDEL").arg(ACTIVE_CHATS_KEY).arg(chat_id))
            .await
    }

    async fn append_turn(&self, chat_id: ChatId, message: &Message) -> Result<(), StoreError> {
        let raw = message
            .to_json()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.query(
            redis::cmd("RPUSH")
                .arg(Self::conversation_key(chat_id))
                .arg(raw),
        )
        .await
    }

    async fn pop_oldest_turn(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.query(redis::cmd("LPOP").arg(Self::conversation_key(chat_id)))
            .await
    }

    async fn get_turns(&self, chat_id: ChatId) -> Result<Vec<Message>, StoreError> {
        let raw: Vec<String> = self
            .query(
                redis::cmd("LRANGE")
                    .arg(Self::conversation_key(chat_id))
                    .arg(0)
                    .arg(-1),
            )
            .await?;

        raw.iter()
            .map(|entry| {
                Message::from_json(entry).map_err(|e| StoreError::Decode {
                    chat_id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn clear_session(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.query(redis::cmd("DEL").arg(Self::conversation_key(chat_id)))
            .await
    }

    async fn count_active_sessions(&self) -> Result<usize, StoreError> {
        self.query(redis::cmd("HLEN").arg(ACTIVE_CHATS_KEY)).await
    }

    async fn list_active_chat_ids(&self) -> Result<Vec<ChatId>, StoreError> {
        let keys: Vec<String> = self.query(redis::cmd("HKEYS").arg(ACTIVE_CHATS_KEY)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| match key.parse::<ChatId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(key = %key, "Skipping malformed chat id in {}", ACTIVE_CHATS_KEY);
                    None
                }
            })
            .collect())
    }

    async fn turn_count(&self, chat_id: ChatId) -> Result<usize, StoreError> {
        self.query(redis::cmd("LLEN").arg(Self::conversation_key(chat_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_key_layout() {
        assert_eq!(RedisSessionStore::conversation_key(42), "conversation:42");
        assert_eq!(RedisSessionStore::conversation_key(-100), "conversation:-100");
    }
}
