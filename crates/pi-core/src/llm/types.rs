//! Inference backend wire types

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{Error, Result};

/// Sampling and context caps forwarded with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_ctx: u32,
    pub num_predict: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_ctx: 2048,
            num_predict: 200,
        }
    }
}

/// Body of `POST /api/generate`
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: GenerateOptions,
}

/// What one decoded backend object contributes to the reply
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// Text fragment (possibly empty)
    Text(String),
    /// The backend reported an error, after any text carried in the same object
    Failed { text: String, message: String },
}

/// Interpret one JSON object from the backend.
///
/// A non-string `response` is treated as no text.
pub fn interpret_chunk(value: &JsonValue) -> ChunkOutcome {
    let text = value
        .get("response")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();
    match value.get("error").filter(|e| !e.is_null()) {
        Some(err) => {
            let msg = err
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            ChunkOutcome::Failed {
                text,
                message: format!("Ollama error: {}", msg),
            }
        }
        None => ChunkOutcome::Text(text),
    }
}

/// Extract the reply from a non-streaming response body
pub fn parse_reply(value: &JsonValue) -> Result<String> {
    if let Some(err) = value.get("error").and_then(JsonValue::as_str) {
        if !err.is_empty() {
            return Err(Error::Provider(format!("Ollama error: {}", err)));
        }
    }
    match value.get("response") {
        None => Ok(String::new()),
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(_) => Err(Error::Provider(
            "Unexpected response type from Ollama.".to_string(),
        )),
    }
}

/// Splits a byte stream into newline-delimited lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    /// Whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}
