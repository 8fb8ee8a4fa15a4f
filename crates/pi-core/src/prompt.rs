//! Prompt composition
//!
//! The context window is the agent's system prompt, then recent history,
//! then the new user message, each wrapped in a role tag.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::memory::{Role, Turn};
use crate::{Error, Result};

/// Name of the single built-in agent
pub const DEFAULT_AGENT: &str = "general";

fn render_history(history: &[Turn]) -> String {
    history
        .iter()
        .filter(|turn| !turn.content.is_empty())
        .map(|turn| match turn.role {
            Role::Assistant => format!("<assistant>\n{}\n</assistant>", turn.content),
            Role::User => format!("<user>\n{}\n</user>", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the full prompt sent to the model
pub fn build_prompt(system: &str, user: &str, history: &[Turn]) -> String {
    let hist = render_history(history);
    if hist.is_empty() {
        format!("<system>\n{system}\n</system>\n\n<user>\n{user}\n</user>")
    } else {
        format!("<system>\n{system}\n</system>\n\n{hist}\n\n<user>\n{user}\n</user>")
    }
}

/// A named agent and its system prompt
#[derive(Debug, Clone)]
pub struct Agent {
    pub name: String,
    pub system_prompt: String,
}

impl Agent {
    /// Load `{prompt_dir}/{name}_system.txt`
    pub fn load(name: &str, prompt_dir: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = prompt_dir.as_ref().join(format!("{name}_system.txt"));
        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!(
                "Failed to read system prompt {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded system prompt for agent '{}' from {}", name, path.display());
        Ok(Self {
            name: name.to_string(),
            system_prompt: text.trim().to_string(),
        })
    }

    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Agents the relay will answer as
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
}

impl AgentRegistry {
    /// Load every built-in agent from `prompt_dir`
    pub fn load(prompt_dir: impl AsRef<Path>) -> Result<Self> {
        let general = Agent::load(DEFAULT_AGENT, prompt_dir)?;
        Ok(Self::from_agents(vec![general]))
    }

    pub fn from_agents(agents: Vec<Agent>) -> Self {
        Self { agents }
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }
}
