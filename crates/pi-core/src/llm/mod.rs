//! Inference provider abstraction
//!
//! Ollama is the only built-in backend; other names resolve to a provider
//! that fails every call.

mod client;
mod provider;
mod types;

pub use client::OllamaClient;
pub use provider::{create_provider, Provider, TextStream};
pub use types::{GenerateOptions, GenerateRequest, LineDecoder};
