//! pi-api: HTTP surface for Pi Relay
//!
//! Chat, agent listing and health endpoints, built with axum.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{app, start_server, AppState};
