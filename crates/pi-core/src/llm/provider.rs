//! Provider trait definition
//!
//! A provider turns a fully composed prompt into model text, either in one
//! piece or as a stream of fragments.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tracing::warn;

use crate::config::Config;
use crate::{Error, Result};

use super::client::OllamaClient;
use super::types::GenerateOptions;

/// Stream of text fragments produced by a provider
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Inference backend contract
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name reported to clients
    fn name(&self) -> &str;

    /// Model the provider generates with
    fn model(&self) -> &str;

    /// Generate the whole reply at once
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;

    /// Generate the reply as a stream of fragments
    ///
    /// Errors before the first fragment are returned directly; later
    /// failures arrive as an `Err` item that ends the stream.
    async fn generate_stream(&self, prompt: &str, options: &GenerateOptions) -> Result<TextStream>;
}

/// Stand-in for a configured provider name with no implementation
struct UnknownProvider {
    name: String,
    model: String,
}

impl UnknownProvider {
    fn error(&self) -> Error {
        Error::Provider(format!("Unknown provider: {}", self.name))
    }
}

#[async_trait]
impl Provider for UnknownProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
        Err(self.error())
    }

    async fn generate_stream(&self, _prompt: &str, _options: &GenerateOptions) -> Result<TextStream> {
        Err(self.error())
    }
}

/// Pick the provider named in the configuration
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    match config.provider.name.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(&config.provider)?)),
        other => {
            warn!("Unknown provider '{}'; chat requests will fail", other);
            Ok(Arc::new(UnknownProvider {
                name: other.to_string(),
                model: config.provider.model.clone(),
            }))
        }
    }
}
