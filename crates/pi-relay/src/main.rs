//! pi-relay: Pi Relay Main Binary
//!
//! Usage:
//!   pi-relay             - Start the HTTP relay
//!   pi-relay --help      - Show help
//!   pi-relay --version   - Show version

use std::sync::Arc;
use std::time::Duration;

use pi_api::AppState;
use pi_core::{create_provider, AgentRegistry, ChatService, Config, ConversationStore};
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    Server,
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args(std::env::args().skip(1)) {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("pi-relay {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting pi-relay...");
    tracing::info!(
        "Provider: {} ({}) at {}",
        config.provider.name,
        config.provider.model,
        config.provider.host
    );

    run_server(config).await
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> RunMode {
    for arg in args {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }
    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("pi-relay - chat relay for a local inference backend");
    println!();
    println!("Usage:");
    println!("  pi-relay             Start the HTTP relay");
    println!("  pi-relay --help      Show this help message");
    println!("  pi-relay --version   Show version");
    println!();
    println!("Environment Variables:");
    println!("  PROVIDER                  Inference provider (default: ollama)");
    println!("  OLLAMA_HOST               Backend URL (default: http://127.0.0.1:11434)");
    println!("  OLLAMA_MODEL_GENERAL      Model name (default: qwen2.5:3b-instruct)");
    println!("  CTX_TOKENS / MAX_TOKENS   Context and output caps (default: 2048 / 200)");
    println!("  TEMPERATURE               Sampling temperature (default: 0.7)");
    println!("  ENABLE_MEMORY             Keep conversation history (default: true)");
    println!("  MEMORY_MAX_TURNS          Turns kept per conversation (default: 8)");
    println!("  MEMORY_TTL_MIN            Idle minutes before expiry, 0 = never (default: 60)");
    println!("  MEMORY_MAX_CONVERSATIONS  Conversations kept (default: 500)");
    println!("  MEMORY_SWEEP_SECS         Background prune interval, 0 = off (default: 0)");
    println!("  API_PORT                  HTTP port (default: 8000)");
    println!("  PROMPT_DIR                System prompt directory (default: prompts)");
}

/// Wire the store, provider and chat service, then serve until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let agents = AgentRegistry::load(&config.agent.prompt_dir)
        .map_err(|e| anyhow::anyhow!("Failed to load agents: {}", e))?;
    tracing::info!("Loaded agents: {:?}", agents.names());

    let provider = create_provider(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create provider: {}", e))?;

    let memory = if config.memory.enabled {
        Some(Arc::new(ConversationStore::new(config.memory.store_limits())))
    } else {
        tracing::info!("Conversation memory is disabled");
        None
    };

    let sweeper = match &memory {
        Some(store) if config.memory.sweep_interval_secs > 0 => {
            let every = Duration::from_secs(config.memory.sweep_interval_secs);
            tracing::info!("Expired-conversation sweep every {:?}", every);
            Some(store.spawn_sweeper(every))
        }
        _ => None,
    };

    let chat = ChatService::new(provider, memory, agents, config.generation.options());
    let state = AppState::new(Arc::new(chat));

    tracing::info!("pi-relay initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        tracing::info!("Shutting down...");
    };
    let result = pi_api::start_server(config.api.port, state, shutdown).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::info!("Shutdown complete");
    result
}
