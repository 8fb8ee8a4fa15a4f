//! pi-core: Pi Relay Core Library
//!
//! Short-term conversation memory, prompt composition, the inference
//! provider abstraction and the chat service that ties them together.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod prompt;

pub use chat::{ChatService, ExchangeRecorder, PreparedChat, ReplyStream};
pub use config::{AgentConfig, ApiConfig, Config, GenerationConfig, MemoryConfig, ProviderConfig};
pub use error::{Error, Result};
pub use llm::{create_provider, GenerateOptions, OllamaClient, Provider, TextStream};
pub use memory::{Clock, ConversationStore, ManualClock, Role, StoreLimits, SystemClock, Turn};
pub use prompt::{build_prompt, Agent, AgentRegistry};
