//! Route table

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{health, metrics, updates};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics))
        .route("/api/v1/updates", post(updates::handle_update))
        .with_state(state)
}
