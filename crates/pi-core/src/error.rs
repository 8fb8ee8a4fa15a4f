//! Error types for pi-core

use thiserror::Error;

/// Main error type for pi-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Provider(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for pi-core
pub type Result<T> = std::result::Result<T, Error>;
