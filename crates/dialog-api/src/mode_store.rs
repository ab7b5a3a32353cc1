//! Per-(chat, user) conversation mode storage

use async_trait::async_trait;
use dashmap::DashMap;

use dialog_core::{ChatId, Mode};

pub type UserId = i64;

#[async_trait]
pub trait ModeStore: Send + Sync {
    async fn get_mode(&self, chat_id: ChatId, user_id: UserId) -> Option<Mode>;

    async fn set_mode(&self, chat_id: ChatId, user_id: UserId, mode: Mode);
}

#[derive(Default)]
pub struct InMemoryModeStore {
    modes: DashMap<(ChatId, UserId), Mode>,
}

impl InMemoryModeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModeStore for InMemoryModeStore {
    async fn get_mode(&self, chat_id: ChatId, user_id: UserId) -> Option<Mode> {
        self.modes.get(&(chat_id, user_id)).map(|entry| *entry.value())
    }

    async fn set_mode(&self, chat_id: ChatId, user_id: UserId, mode: Mode) {
        self.modes.insert((chat_id, user_id), mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_modes_are_keyed_per_chat_and_user() {
        let store = InMemoryModeStore::new();
        assert_eq!(store.get_mode(1, 10).await, None);

        store.set_mode(1, 10, Mode::Inline).await;
        store.set_mode(1, 11, Mode::Window).await;

        assert_eq!(store.get_mode(1, 10).await, Some(Mode::Inline));
        assert_eq!(store.get_mode(1, 11).await, Some(Mode::Window));
        assert_eq!(store.get_mode(2, 10).await, None);

        store.set_mode(1, 10, Mode::Window).await;
        assert_eq!(store.get_mode(1, 10).await, Some(Mode::Window));
    }
}
