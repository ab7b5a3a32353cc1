//! Domain errors

use std::time::Duration;
use thiserror::Error;

use crate::domain::ChatId;

#[derive(Error, Debug)]
pub enum DialogError {
    #[error("Session already exists for chat {0}")]
    SessionAlreadyExists(ChatId),

    #[error("No session for chat {0}")]
    NoSession(ChatId),

    #[error("Conversation mode is not selected")]
    UndeterminedMode,

    #[error("Conversation for chat {0} cannot be compacted further")]
    CannotCompactFurther(ChatId),

    #[error("Chat worker for {0} stopped before replying")]
    WorkerGone(ChatId),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DialogError {
    /// Exhaustion the caller should report as "out of memory":
    /// either uncompacted (inline) or compacted down to the floor (window).
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            DialogError::CannotCompactFurther(_)
                | DialogError::Engine(EngineError::ResourceExhausted(_))
        )
    }
}

/// Failures reported by a generation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Engine error: {0}")]
    Failed(String),
}

/// Failures reported by a session store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Corrupt turn in log for chat {chat_id}: {reason}")]
    Decode { chat_id: ChatId, reason: String },
}
