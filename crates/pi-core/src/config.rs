//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `pi-relay.toml` config file
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the config file is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::llm::GenerateOptions;
use crate::memory::StoreLimits;
use crate::Error;

/// Default config file looked up by [`Config::load`]
pub const CONFIG_FILE: &str = "pi-relay.toml";

/// Inference backend settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Provider name; only "ollama" is built in
    pub name: String,
    /// Backend base URL
    pub host: String,
    /// Model used by the general agent
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "ollama".to_string(),
            host: "http://127.0.0.1:11434".to_string(),
            model: "qwen2.5:3b-instruct".to_string(),
        }
    }
}

/// Generation caps forwarded to the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub ctx_tokens: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            ctx_tokens: 2048,
            max_tokens: 200,
            temperature: 0.7,
        }
    }
}

impl GenerationConfig {
    pub fn options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.temperature,
            num_ctx: self.ctx_tokens,
            num_predict: self.max_tokens,
        }
    }
}

/// Conversation memory settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// Prepend and record history at all
    pub enabled: bool,
    pub max_turns: i64,
    /// Idle lifetime in minutes; 0 disables expiry
    pub ttl_minutes: i64,
    pub max_conversations: i64,
    /// Background prune interval in seconds; 0 keeps expiry lazy
    pub sweep_interval_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_turns: 8,
            ttl_minutes: 60,
            max_conversations: 500,
            sweep_interval_secs: 0,
        }
    }
}

impl MemoryConfig {
    /// Store limits with negative values clamped away
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits::new(
            self.max_turns.max(0) as usize,
            (self.ttl_minutes.max(0) as u64).saturating_mul(60),
            self.max_conversations.max(0) as usize,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Port for HTTP API server
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Directory holding `<agent>_system.txt` prompt files
    pub prompt_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            prompt_dir: "prompts".to_string(),
        }
    }
}

/// Main configuration for pi-relay
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub provider: ProviderConfig,
    pub generation: GenerationConfig,
    pub memory: MemoryConfig,
    pub api: ApiConfig,
    pub agent: AgentConfig,
}

/// Truthy spellings accepted for boolean env vars
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

impl Config {
    /// Replace `${VAR_NAME}` with the variable's value (empty when unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    if !name.is_empty() {
                        result.push_str(&std::env::var(name).unwrap_or_default());
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    // unterminated: drop the marker, keep the tail
                    rest = after;
                }
            }
        }
        result.push_str(rest);
        result
    }

    /// Load configuration from a TOML file, then apply env overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let toml: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(Self::from_toml_config(toml))
    }

    /// Load from `./pi-relay.toml` when present, otherwise from the environment
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }
        Ok(Self::from_env())
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let defaults = Self::default();

        let provider = toml.provider.unwrap_or_default();
        let generation = toml.generation.unwrap_or_default();
        let memory = toml.memory.unwrap_or_default();
        let api = toml.api.unwrap_or_default();
        let agent = toml.agent.unwrap_or_default();

        Config {
            provider: ProviderConfig {
                name: provider.name.unwrap_or(defaults.provider.name),
                host: provider.host.unwrap_or(defaults.provider.host),
                model: provider.model.unwrap_or(defaults.provider.model),
            },
            generation: GenerationConfig {
                ctx_tokens: generation.ctx_tokens.unwrap_or(defaults.generation.ctx_tokens),
                max_tokens: generation.max_tokens.unwrap_or(defaults.generation.max_tokens),
                temperature: generation.temperature.unwrap_or(defaults.generation.temperature),
            },
            memory: MemoryConfig {
                enabled: memory.enabled.unwrap_or(defaults.memory.enabled),
                max_turns: memory.max_turns.unwrap_or(defaults.memory.max_turns),
                ttl_minutes: memory.ttl_minutes.unwrap_or(defaults.memory.ttl_minutes),
                max_conversations: memory
                    .max_conversations
                    .unwrap_or(defaults.memory.max_conversations),
                sweep_interval_secs: memory
                    .sweep_interval_secs
                    .unwrap_or(defaults.memory.sweep_interval_secs),
            },
            api: ApiConfig {
                port: api.port.unwrap_or(defaults.api.port),
            },
            agent: AgentConfig {
                prompt_dir: agent.prompt_dir.unwrap_or(defaults.agent.prompt_dir),
            },
        }
    }

    /// Override settings from environment variables
    fn apply_env_overrides(&mut self) {
        fn non_empty(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        }
        fn parsed<T: std::str::FromStr>(key: &str, slot: &mut T) {
            if let Some(v) = non_empty(key).and_then(|v| v.trim().parse().ok()) {
                *slot = v;
            }
        }

        // Provider
        if let Some(name) = non_empty("PROVIDER") {
            self.provider.name = name.to_lowercase();
        }
        if let Some(host) = non_empty("OLLAMA_HOST") {
            self.provider.host = host;
        }
        if let Some(model) = non_empty("OLLAMA_MODEL_GENERAL") {
            self.provider.model = model;
        }

        // Generation caps
        parsed("CTX_TOKENS", &mut self.generation.ctx_tokens);
        parsed("MAX_TOKENS", &mut self.generation.max_tokens);
        parsed("TEMPERATURE", &mut self.generation.temperature);

        // Memory
        if let Some(enabled) = non_empty("ENABLE_MEMORY") {
            self.memory.enabled = parse_bool(&enabled);
        }
        parsed("MEMORY_MAX_TURNS", &mut self.memory.max_turns);
        parsed("MEMORY_TTL_MIN", &mut self.memory.ttl_minutes);
        parsed("MEMORY_MAX_CONVERSATIONS", &mut self.memory.max_conversations);
        parsed("MEMORY_SWEEP_SECS", &mut self.memory.sweep_interval_secs);

        // API
        parsed("API_PORT", &mut self.api.port);

        // Agents
        if let Some(dir) = non_empty("PROMPT_DIR") {
            self.agent.prompt_dir = dir;
        }
    }
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    provider: Option<TomlProviderConfig>,
    generation: Option<TomlGenerationConfig>,
    memory: Option<TomlMemoryConfig>,
    api: Option<TomlApiConfig>,
    agent: Option<TomlAgentConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlProviderConfig {
    name: Option<String>,
    host: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlGenerationConfig {
    ctx_tokens: Option<u32>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlMemoryConfig {
    enabled: Option<bool>,
    max_turns: Option<i64>,
    ttl_minutes: Option<i64>,
    max_conversations: Option<i64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlApiConfig {
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlAgentConfig {
    prompt_dir: Option<String>,
}
