//! Synchronous and streaming chat on top of a [`ChatBackend`].
//!
//! The synchronous path never fails because of the backend: when the model
//! is unreachable the caller gets a canned offline reply, flagged as
//! [`ChatOutcome::Degraded`]. The streaming path reports backend trouble as a
//! terminal [`StreamEvent::Error`] instead.

use crate::backend::{ChatBackend, ChatMessage, ChatReply, HistoryRecord, HistorySink, NoopHistory, Role};
use crate::error::GateError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer any question concisely and in a friendly tone.";

pub const DEFAULT_MODEL: &str = "chat-default";

/// Longest silence tolerated between two streamed chunks.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub const STREAM_TIMEOUT_MESSAGE: &str = "Stream timed out, please retry";

const STREAM_BUFFER: usize = 32;

/// A chat turn as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), history: Vec::new(), stream: false }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn validate(&self) -> Result<(), GateError> {
        if self.message.trim().is_empty() {
            return Err(GateError::InvalidRequest("Message cannot be empty".into()));
        }
        Ok(())
    }
}

/// System prompt, then prior turns, then the new user message.
pub fn build_messages(system_prompt: &str, history: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(message));
    messages
}

/// Canned reply used while the backend is unreachable.
pub fn offline_reply(messages: &[ChatMessage]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let lower = last_user.to_lowercase();
    if lower.contains("hello") || lower.contains("hi") {
        "Hello! I'm the chat assistant, happy to help.".to_string()
    } else if lower.contains("name") {
        "I'm the chat assistant.".to_string()
    } else if lower.contains("help") {
        "I can answer questions, look things up and help you work through problems. What do you need?"
            .to_string()
    } else {
        format!(
            "I received your message: {last_user}. The assistant is in offline mode right now; \
             answers will be more useful once the model is reachable again."
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Answered(ChatReply),
    /// The backend failed; this is the offline reply.
    Degraded(String),
}

impl ChatOutcome {
    pub fn content(&self) -> &str {
        match self {
            ChatOutcome::Answered(reply) => &reply.content,
            ChatOutcome::Degraded(text) => text,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ChatOutcome::Degraded(_))
    }
}

/// What a streaming consumer receives. `Done` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Message(String),
    Done,
    Error(String),
}

pub struct ChatService {
    backend: Arc<dyn ChatBackend>,
    history: Arc<dyn HistorySink>,
    system_prompt: String,
    model: String,
    idle_timeout: Duration,
}

impl ChatService {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            history: Arc::new(NoopHistory),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            idle_timeout: STREAM_IDLE_TIMEOUT,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Answer `request` synchronously.
    ///
    /// Only an invalid request is an error; backend failures degrade to an
    /// offline reply.
    pub async fn chat(
        &self,
        owner_id: &str,
        session_id: &str,
        request: &ChatRequest,
    ) -> Result<ChatOutcome, GateError> {
        request.validate()?;
        let messages = build_messages(&self.system_prompt, &request.history, &request.message);

        let reply = match self.backend.complete(&messages).await {
            Ok(reply) if !reply.content.trim().is_empty() => reply,
            Ok(_) => {
                warn!(target: "chatgate::chat", owner_id, "chat backend returned an empty reply, serving offline reply");
                return Ok(ChatOutcome::Degraded(offline_reply(&messages)));
            }
            Err(err) => {
                warn!(target: "chatgate::chat", owner_id, error = %err, "chat backend unavailable, serving offline reply");
                return Ok(ChatOutcome::Degraded(offline_reply(&messages)));
            }
        };

        let record = HistoryRecord {
            owner_id: owner_id.to_string(),
            session_id: session_id.to_string(),
            user_message: request.message.clone(),
            assistant_message: reply.content.clone(),
            model: self.model.clone(),
        };
        if let Err(err) = self.history.record(record).await {
            warn!(target: "chatgate::chat", owner_id, error = %err, "failed to save chat history");
        }
        Ok(ChatOutcome::Answered(reply))
    }

    /// Stream a reply for `request`.
    ///
    /// Events arrive on the returned receiver; the last one is always `Done`
    /// or `Error` unless the receiver is dropped first, which also stops the
    /// backend call. Must be called within a tokio runtime.
    pub fn stream_chat(&self, request: &ChatRequest) -> Result<mpsc::Receiver<StreamEvent>, GateError> {
        request.validate()?;
        let messages = build_messages(&self.system_prompt, &request.history, &request.message);
        let (events, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(relay_stream(self.backend.clone(), messages, events, self.idle_timeout));
        Ok(rx)
    }
}

async fn relay_stream(
    backend: Arc<dyn ChatBackend>,
    messages: Vec<ChatMessage>,
    events: mpsc::Sender<StreamEvent>,
    idle_timeout: Duration,
) {
    let (chunk_tx, mut chunks) = mpsc::channel::<String>(STREAM_BUFFER);
    let producer = tokio::spawn(async move { backend.stream(&messages, chunk_tx).await });

    loop {
        tokio::select! {
            _ = events.closed() => {
                debug!(target: "chatgate::chat", "stream consumer went away");
                producer.abort();
                return;
            }
            next = tokio::time::timeout(idle_timeout, chunks.recv()) => match next {
                Ok(Some(chunk)) => {
                    if events.send(StreamEvent::Message(chunk)).await.is_err() {
                        producer.abort();
                        return;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(target: "chatgate::chat", timeout = ?idle_timeout, "stream idle timeout");
                    producer.abort();
                    let _ = events.send(StreamEvent::Error(STREAM_TIMEOUT_MESSAGE.to_string())).await;
                    return;
                }
            }
        }
    }

    let terminal = match producer.await {
        Ok(Ok(())) => {
            info!(target: "chatgate::chat", "stream completed");
            StreamEvent::Done
        }
        Ok(Err(err)) => {
            warn!(target: "chatgate::chat", error = %err, "stream failed");
            StreamEvent::Error(format!("Error: {err}"))
        }
        Err(join) => {
            warn!(target: "chatgate::chat", error = %join, "stream task ended abnormally");
            StreamEvent::Error("Error: stream interrupted".to_string())
        }
    };
    let _ = events.send(terminal).await;
}
