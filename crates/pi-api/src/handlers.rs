//! HTTP API handlers

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::server::AppState;

/// Longest accepted chat message, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

pub const CONVERSATION_ID_HEADER: HeaderName = HeaderName::from_static("x-conversation-id");

// ============================================================================
// Request/Response types
// ============================================================================

/// Chat request payload
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// User message
    pub message: String,
    /// Agent to answer as
    #[serde(default = "default_agent")]
    pub agent: String,
    /// Stream plain-text fragments instead of returning JSON
    #[serde(default)]
    pub stream: bool,
    /// Conversation to continue; a new one is started when absent
    pub conversation_id: Option<String>,
}

fn default_agent() -> String {
    pi_core::prompt::DEFAULT_AGENT.to_string()
}

impl ChatRequest {
    fn validate(&self) -> Result<()> {
        let len = self.message.chars().count();
        if len == 0 {
            return Err(ApiError::InvalidRequest("message must not be empty".to_string()));
        }
        if len > MAX_MESSAGE_CHARS {
            return Err(ApiError::InvalidRequest(format!(
                "message must be at most {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        Ok(())
    }
}

/// Chat response payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub conversation_id: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentsResponse {
    pub agents: Vec<String>,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Liveness check
pub async fn health(State(state): State<AppState>) -> Json<JsonValue> {
    let conversations = match state.chat.memory() {
        Some(store) => store.len().await,
        None => 0,
    };
    Json(json!({ "status": "ok", "conversations": conversations }))
}

/// Enumerate available agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentsResponse> {
    Json(AgentsResponse {
        agents: state.chat.agents().names(),
    })
}

/// Chat endpoint: JSON reply, or a plain-text stream when `stream` is set
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    req.validate()?;
    debug!("Chat request: agent={}, stream={}", req.agent, req.stream);

    let agent = state
        .chat
        .agents()
        .get(&req.agent)
        .ok_or_else(|| ApiError::UnknownAgent(req.agent.clone()))?;

    let prepared = state
        .chat
        .prepare(agent, &req.message, req.conversation_id)
        .await;

    if !req.stream {
        let reply = state.chat.reply(&prepared).await?;
        info!("Chat reply: {} chars", reply.len());
        let provider = state.chat.provider();
        return Ok(Json(ChatResponse {
            reply,
            conversation_id: Some(prepared.conversation_id),
            model: Some(provider.model().to_string()),
            provider: Some(provider.name().to_string()),
        })
        .into_response());
    }

    let id_header = HeaderValue::from_str(&prepared.conversation_id).map_err(|_| {
        ApiError::InvalidRequest("conversation_id is not a valid header value".to_string())
    })?;
    let fragments = state.chat.reply_stream(&prepared).await?;
    let body = Body::from_stream(fragments.map(Ok::<_, Infallible>));

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (CONVERSATION_ID_HEADER, id_header),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::app;
    use async_trait::async_trait;
    use axum::http::Request;
    use pi_core::{
        Agent, AgentRegistry, ChatService, ConversationStore, GenerateOptions, Provider,
        StoreLimits, TextStream,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Provider that streams fixed fragments; `Err` items fail mid-stream
    struct FakeProvider {
        fragments: Vec<std::result::Result<&'static str, &'static str>>,
        fail_upfront: bool,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            "ollama"
        }

        fn model(&self) -> &str {
            "fake-model"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> pi_core::Result<String> {
            if self.fail_upfront {
                return Err(pi_core::Error::Provider("Ollama HTTP error: refused".into()));
            }
            Ok(self.fragments.iter().filter_map(|f| f.ok()).collect())
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> pi_core::Result<TextStream> {
            if self.fail_upfront {
                return Err(pi_core::Error::Provider("Ollama HTTP error: refused".into()));
            }
            let items: Vec<pi_core::Result<String>> = self
                .fragments
                .iter()
                .map(|f| match f {
                    Ok(t) => Ok(t.to_string()),
                    Err(m) => Err(pi_core::Error::Provider(m.to_string())),
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn state_with(provider: FakeProvider) -> (AppState, Arc<ConversationStore>) {
        let memory = Arc::new(ConversationStore::new(StoreLimits::default()));
        let chat = ChatService::new(
            Arc::new(provider),
            Some(memory.clone()),
            AgentRegistry::from_agents(vec![Agent::new("general", "sys")]),
            GenerateOptions::default(),
        );
        (AppState::new(Arc::new(chat)), memory)
    }

    fn ok_provider() -> FakeProvider {
        FakeProvider {
            fragments: vec![Ok("Hel"), Ok("lo")],
            fail_upfront: false,
        }
    }

    async fn send(state: AppState, request: Request<Body>) -> Response {
        app(state).oneshot(request).await.unwrap()
    }

    fn post_chat(body: JsonValue) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> JsonValue {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state_with(ok_provider());
        let response = send(state, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["conversations"], 0);
    }

    #[tokio::test]
    async fn test_list_agents() {
        let (state, _) = state_with(ok_provider());
        let response = send(state, Request::get("/agents").body(Body::empty()).unwrap()).await;
        assert_eq!(body_json(response).await, json!({"agents": ["general"]}));
    }

    #[tokio::test]
    async fn test_chat_non_stream() {
        let (state, memory) = state_with(ok_provider());
        let response = send(
            state,
            post_chat(json!({"message": "hi", "conversation_id": "c1"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: ChatResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.reply, "Hello");
        assert_eq!(body.conversation_id.as_deref(), Some("c1"));
        assert_eq!(body.model.as_deref(), Some("fake-model"));
        assert_eq!(body.provider.as_deref(), Some("ollama"));
        assert_eq!(memory.get("c1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_chat_mints_conversation_id() {
        let (state, _) = state_with(ok_provider());
        let response = send(state, post_chat(json!({"message": "hi"}))).await;
        let body = body_json(response).await;
        assert!(!body["conversation_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_unknown_agent() {
        let (state, _) = state_with(ok_provider());
        let response = send(state, post_chat(json!({"message": "hi", "agent": "coder"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "unknown agent");
    }

    #[tokio::test]
    async fn test_chat_validation() {
        let (state, _) = state_with(ok_provider());
        let empty = send(state.clone(), post_chat(json!({"message": ""}))).await;
        assert_eq!(empty.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        let too_long = send(state.clone(), post_chat(json!({"message": long}))).await;
        assert_eq!(too_long.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let missing = send(state, post_chat(json!({"agent": "general"}))).await;
        assert_eq!(missing.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_chat_provider_error_is_bad_gateway() {
        let (state, memory) = state_with(FakeProvider {
            fragments: vec![],
            fail_upfront: true,
        });
        let response = send(
            state.clone(),
            post_chat(json!({"message": "hi", "conversation_id": "c1"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(memory.get("c1").await.is_empty());

        let streamed = send(
            state,
            post_chat(json!({"message": "hi", "stream": true, "conversation_id": "c1"})),
        )
        .await;
        assert_eq!(streamed.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_chat_stream() {
        let (state, memory) = state_with(ok_provider());
        let response = send(
            state,
            post_chat(json!({"message": "hi", "stream": true, "conversation_id": "s1"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&CONVERSATION_ID_HEADER], "s1");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Hello");

        let turns = memory.get("s1").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_chat_stream_then_follow_up_sees_history() {
        let (state, memory) = state_with(ok_provider());
        let first = send(
            state.clone(),
            post_chat(json!({"message": "hi", "stream": true, "conversation_id": "s2"})),
        )
        .await;
        axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();

        let second = send(
            state,
            post_chat(json!({"message": "again", "conversation_id": "s2"})),
        )
        .await;
        assert_eq!(second.status(), StatusCode::OK);

        let contents: Vec<String> = memory.get("s2").await.into_iter().map(|t| t.content).collect();
        assert_eq!(contents, vec!["hi", "Hello", "again", "Hello"]);
    }

    #[tokio::test]
    async fn test_chat_stream_mid_error_returns_partial() {
        let (state, _) = state_with(FakeProvider {
            fragments: vec![Ok("partial "), Err("network dropped")],
            fail_upfront: false,
        });
        let response = send(
            state,
            post_chat(json!({"message": "stream please", "stream": true})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"partial ");
    }
}
