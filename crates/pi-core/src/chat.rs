//! Chat service
//!
//! Composes the prompt from history, calls the provider, and records the
//! exchange back into conversation memory.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, error, warn};

use crate::llm::{GenerateOptions, Provider, TextStream};
use crate::memory::ConversationStore;
use crate::prompt::{build_prompt, Agent, AgentRegistry};
use crate::Result;

/// Stream of reply text handed to the HTTP layer
pub type ReplyStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// A prompt ready to send, bound to its conversation
#[derive(Debug, Clone)]
pub struct PreparedChat {
    pub conversation_id: String,
    pub user_message: String,
    pub prompt: String,
}

pub struct ChatService {
    provider: Arc<dyn Provider>,
    memory: Option<Arc<ConversationStore>>,
    agents: AgentRegistry,
    options: GenerateOptions,
}

impl ChatService {
    /// `memory` is `None` when history is disabled
    pub fn new(
        provider: Arc<dyn Provider>,
        memory: Option<Arc<ConversationStore>>,
        agents: AgentRegistry,
        options: GenerateOptions,
    ) -> Self {
        Self {
            provider,
            memory,
            agents,
            options,
        }
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn memory(&self) -> Option<&Arc<ConversationStore>> {
        self.memory.as_ref()
    }

    /// Resolve the conversation id and build the prompt with recent history
    pub async fn prepare(
        &self,
        agent: &Agent,
        message: &str,
        conversation_id: Option<String>,
    ) -> PreparedChat {
        let conversation_id = conversation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let history = match &self.memory {
            Some(store) => store.get(&conversation_id).await,
            None => Vec::new(),
        };
        debug!(
            "Preparing chat for {} with {} history turns",
            conversation_id,
            history.len()
        );

        PreparedChat {
            prompt: build_prompt(&agent.system_prompt, message, &history),
            user_message: message.to_string(),
            conversation_id,
        }
    }

    /// Generate the full reply and record the exchange
    pub async fn reply(&self, prepared: &PreparedChat) -> Result<String> {
        let reply = self.provider.generate(&prepared.prompt, &self.options).await?;
        self.record_exchange(&prepared.conversation_id, &prepared.user_message, &reply)
            .await;
        Ok(reply)
    }

    /// Start a streaming reply.
    ///
    /// The exchange is recorded once the stream ends, fails midway, or is
    /// dropped early by a disconnecting client. A mid-stream failure is
    /// logged and simply ends the stream.
    pub async fn reply_stream(&self, prepared: &PreparedChat) -> Result<ReplyStream> {
        let fragments = self
            .provider
            .generate_stream(&prepared.prompt, &self.options)
            .await?;
        let recorder = ExchangeRecorder::new(
            self.memory.clone(),
            prepared.conversation_id.clone(),
            prepared.user_message.clone(),
        );
        Ok(Box::pin(recording_stream(fragments, recorder)))
    }

    /// Append the user turn, then the assistant turn
    pub async fn record_exchange(&self, conversation_id: &str, user_message: &str, reply: &str) {
        if let Some(store) = &self.memory {
            store.append(conversation_id, "user", user_message).await;
            store.append(conversation_id, "assistant", reply).await;
        }
    }
}

/// Accumulates streamed text and records the exchange exactly once.
///
/// A stream that runs to completion or fails midway records through
/// [`ExchangeRecorder::finish`] before the reply ends. A recorder dropped
/// unfinished, as when the client disconnects, records from a spawned task.
pub struct ExchangeRecorder {
    memory: Option<Arc<ConversationStore>>,
    conversation_id: String,
    user_message: String,
    reply: String,
}

impl ExchangeRecorder {
    pub fn new(
        memory: Option<Arc<ConversationStore>>,
        conversation_id: String,
        user_message: String,
    ) -> Self {
        Self {
            memory,
            conversation_id,
            user_message,
            reply: String::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) {
        self.reply.push_str(fragment);
    }

    /// Append the user turn, then the accumulated reply, and disarm the drop path
    pub async fn finish(&mut self) {
        let Some(store) = self.memory.take() else { return };
        store.append(&self.conversation_id, "user", &self.user_message).await;
        store.append(&self.conversation_id, "assistant", &self.reply).await;
    }
}

impl Drop for ExchangeRecorder {
    fn drop(&mut self) {
        let Some(store) = self.memory.take() else { return };
        let conversation_id = std::mem::take(&mut self.conversation_id);
        let user_message = std::mem::take(&mut self.user_message);
        let reply = std::mem::take(&mut self.reply);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Reply stream for {} dropped early", conversation_id);
                handle.spawn(async move {
                    store.append(&conversation_id, "user", &user_message).await;
                    store.append(&conversation_id, "assistant", &reply).await;
                });
            }
            Err(_) => warn!(
                "No runtime available; dropping exchange for {}",
                conversation_id
            ),
        }
    }
}

struct RecordingState {
    fragments: TextStream,
    recorder: ExchangeRecorder,
}

fn recording_stream(
    fragments: TextStream,
    recorder: ExchangeRecorder,
) -> impl Stream<Item = String> + Send {
    futures::stream::unfold(
        RecordingState {
            fragments,
            recorder,
        },
        |mut state| async move {
            match state.fragments.next().await {
                Some(Ok(text)) => {
                    state.recorder.push(&text);
                    Some((text, state))
                }
                Some(Err(e)) => {
                    error!("streaming error occurred: {}", e);
                    state.recorder.finish().await;
                    None
                }
                None => {
                    state.recorder.finish().await;
                    None
                }
            }
        },
    )
}
