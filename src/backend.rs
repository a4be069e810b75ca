//! Collaborator interfaces: the upstream chat model and chat-history storage.
//!
//! The gate never talks to a model provider itself. Deployments plug in a
//! [`ChatBackend`] (an HTTP client to the provider) and a [`HistorySink`]
//! (their persistence layer).

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<Usage>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), usage: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("chat backend request failed: {0}")]
    Request(String),
    #[error("chat backend answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("no valid response received from the chat backend")]
    EmptyReply,
}

/// Upstream chat model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatReply, BackendError>;

    /// Stream the reply as text chunks into `chunks`.
    ///
    /// Returning `Ok` means the reply is complete. A send error on `chunks`
    /// means the consumer went away; implementations should stop early. The
    /// default sends the whole `complete` reply as one chunk.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        chunks: mpsc::Sender<String>,
    ) -> Result<(), BackendError> {
        let reply = self.complete(messages).await?;
        let _ = chunks.send(reply.content).await;
        Ok(())
    }
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatReply, BackendError> {
        (**self).complete(messages).await
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        chunks: mpsc::Sender<String>,
    ) -> Result<(), BackendError> {
        (**self).stream(messages, chunks).await
    }
}

/// One finished exchange, forwarded to history persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub owner_id: String,
    pub session_id: String,
    pub user_message: String,
    pub assistant_message: String,
    pub model: String,
}

/// Chat-history persistence. Failures are logged by callers, never surfaced.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, record: HistoryRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHistory;

#[async_trait]
impl HistorySink for NoopHistory {
    async fn record(&self, _record: HistoryRecord) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Keeps records in memory; clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    records: Arc<Mutex<Vec<HistoryRecord>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl HistorySink for MemoryHistory {
    async fn record(&self, record: HistoryRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
        Ok(())
    }
}
