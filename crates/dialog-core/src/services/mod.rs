//! Domain services (business logic)

pub mod conversation_manager;
pub mod dispatcher;

pub use conversation_manager::{ConversationManager, ManagerConfig};
pub use dispatcher::ChatDispatcher;
