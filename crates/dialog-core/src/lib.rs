//! # Dialog Core
//! 
//! Conversation model, session store and engine ports, and the conversation
//! manager with its memory-pressure compaction.

pub mod domain;
pub mod engine;
pub mod services;
pub mod repositories;
pub mod error;

pub use domain::*;
pub use engine::GenerationEngine;
pub use error::{DialogError, EngineError, StoreError};
pub use repositories::{InMemorySessionStore, SessionStore};
pub use services::{ChatDispatcher, ConversationManager, ManagerConfig};
