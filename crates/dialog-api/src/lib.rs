//! # Dialog API
//! 
//! HTTP handlers, chat commands, reply texts, mode storage and metrics.

pub mod commands;
pub mod handlers;
pub mod metrics;
pub mod mode_store;
pub mod replies;
pub mod response;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
