//! # Dialog Core - Domain Module
//! 
//! Chat turns, the per-turn conversation window, and the failure policy.

pub mod message;
pub mod conversation;
pub mod mode;

pub use message::{Message, Role};
pub use conversation::{Conversation, PromptFormat};
pub use mode::Mode;

/// Opaque chat identifier assigned by the transport.
pub type ChatId = i64;
