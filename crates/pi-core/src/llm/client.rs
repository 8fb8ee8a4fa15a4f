//! Ollama HTTP client

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

use super::provider::{Provider, TextStream};
use super::types::*;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REPLY_TIMEOUT: Duration = Duration::from_secs(60);
const STREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for a local Ollama server
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    host: String,
    model: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.host)
    }

    async fn post(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            options: *options,
        };
        let url = self.endpoint();
        debug!("Sending request to Ollama: {} (stream={})", url, stream);

        let response = self
            .client
            .post(&url)
            .timeout(if stream { STREAM_TIMEOUT } else { REPLY_TIMEOUT })
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama HTTP error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Ollama error: {} - {}", status, body);
            return Err(Error::Provider(format!(
                "Ollama HTTP error: {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let response = self.post(prompt, options, false).await?;
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Ollama HTTP error: {}", e)))?;
        let reply = parse_reply(&body)?;
        info!("Ollama reply: {} chars", reply.len());
        Ok(reply)
    }

    async fn generate_stream(&self, prompt: &str, options: &GenerateOptions) -> Result<TextStream> {
        let response = self.post(prompt, options, true).await?;
        Ok(Box::pin(ndjson_text_stream(Box::pin(response.bytes_stream()))))
    }
}

struct StreamState<S> {
    bytes: S,
    decoder: LineDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> StreamState<S> {
    /// Queue the outcome of one line; returns false once the backend reported an error
    fn accept_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }
        let Ok(value) = serde_json::from_str::<JsonValue>(line) else {
            debug!("Skipping undecodable line from Ollama");
            return true;
        };
        match interpret_chunk(&value) {
            ChunkOutcome::Text(text) => {
                if !text.is_empty() {
                    self.pending.push_back(Ok(text));
                }
                true
            }
            ChunkOutcome::Failed { text, message } => {
                if !text.is_empty() {
                    self.pending.push_back(Ok(text));
                }
                self.pending.push_back(Err(Error::Provider(message)));
                false
            }
        }
    }
}

/// Turn a raw NDJSON byte stream into text fragments
pub(crate) fn ndjson_text_stream<S, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin,
    E: std::fmt::Display + Send,
{
    let state = StreamState {
        bytes,
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in state.decoder.push(&chunk) {
                        if !state.accept_line(&line) {
                            state.finished = true;
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(Error::Provider(format!(
                        "Ollama stream error: {}",
                        e
                    ))));
                    state.finished = true;
                }
                None => {
                    if let Some(line) = state.decoder.finish() {
                        state.accept_line(&line);
                    }
                    state.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    fn bytes_stream(
        parts: Vec<&'static str>,
    ) -> impl Stream<Item = std::result::Result<Bytes, String>> + Send + Unpin {
        futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))))
    }

    async fn collect(stream: impl Stream<Item = Result<String>>) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_ndjson_stream_reassembles_lines() {
        let out = collect(ndjson_text_stream(bytes_stream(vec![
            "{\"response\":\"Hel\"}\n{\"resp",
            "onse\":\"lo\"}\n\nnot json\n",
            "{\"response\":\"\",\"done\":true}",
        ])))
        .await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_ndjson_stream_error_ends_stream() {
        let out = collect(ndjson_text_stream(bytes_stream(vec![
            "{\"response\":\"partial\"}\n{\"error\":\"out of memory\"}\n{\"response\":\"never\"}\n",
        ])))
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "partial");
        assert!(matches!(&out[1], Err(Error::Provider(m)) if m.contains("out of memory")));
    }

    #[tokio::test]
    async fn test_ndjson_stream_text_alongside_error() {
        let out = collect(ndjson_text_stream(bytes_stream(vec![
            "{\"response\":\"Hi\"}\n{\"response\":\" there\",\"error\":\"context overflow\"}\n",
        ])))
        .await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), "Hi");
        assert_eq!(out[1].as_ref().unwrap(), " there");
        assert!(matches!(&out[2], Err(Error::Provider(m)) if m.contains("context overflow")));
    }

    #[tokio::test]
    async fn test_ndjson_stream_transport_error() {
        let parts = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"response\":\"a\"}\n")),
            Err("connection reset".to_string()),
        ]);
        let out = collect(ndjson_text_stream(parts)).await;
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
    }

    /// Serve `router` on an ephemeral port and return its base URL
    async fn mock_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(host: String) -> OllamaClient {
        OllamaClient::new(&ProviderConfig {
            host,
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_against_mock_backend() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<JsonValue>| async move {
                assert_eq!(body["stream"], false);
                assert_eq!(body["options"]["num_predict"], 200);
                Json(json!({"response": format!("echo: {}", body["prompt"].as_str().unwrap())}))
            }),
        );
        let client = client_for(mock_backend(router).await);

        let reply = client.generate("ping", &GenerateOptions::default()).await.unwrap();
        assert_eq!(reply, "echo: ping");
        assert_eq!(client.model(), "qwen2.5:3b-instruct");
    }

    #[tokio::test]
    async fn test_generate_backend_error_field() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { Json(json!({"error": "model 'x' not found"})) }),
        );
        let client = client_for(mock_backend(router).await);

        let err = client.generate("ping", &GenerateOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("model 'x' not found"));
    }

    #[tokio::test]
    async fn test_generate_http_status_error() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = client_for(mock_backend(router).await);

        let err = client.generate("ping", &GenerateOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn test_generate_stream_against_mock_backend() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async {
                "{\"response\":\"Hi\"}\n{\"response\":\" there\"}\n{\"response\":\"\",\"done\":true}\n"
            }),
        );
        let client = client_for(mock_backend(router).await);

        let stream = client
            .generate_stream("ping", &GenerateOptions::default())
            .await
            .unwrap();
        let text: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(text.concat(), "Hi there");
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // port 9 (discard) on loopback is not expected to accept HTTP
        let client = client_for("http://127.0.0.1:9".to_string());
        let err = client.generate("ping", &GenerateOptions::default()).await.unwrap_err();
        assert!(err.to_string().starts_with("Ollama HTTP error"));
    }
}
