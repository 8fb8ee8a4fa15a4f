//! Route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{chat, health, list_agents};
use crate::server::AppState;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/agents", get(list_agents))
        .route("/chat", post(chat))
}
