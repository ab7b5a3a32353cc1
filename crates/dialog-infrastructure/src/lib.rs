//! # Dialog Infrastructure
//! 
//! Cache and generation engine implementations (adapters).

pub mod cache;
pub mod engine;

pub use cache::{create_pool, PoolError, RedisSessionStore};
pub use engine::LlamaServerEngine;
