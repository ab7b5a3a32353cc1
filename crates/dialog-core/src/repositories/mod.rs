//! Repository traits (ports) and the in-memory adapter

pub mod session_store;
pub mod memory_store;

pub use session_store::SessionStore;
pub use memory_store::InMemorySessionStore;
