#![allow(dead_code)]

use async_trait::async_trait;
use chatgate::backend::{BackendError, ChatBackend, ChatMessage, ChatReply};
use chatgate::jobs::{InMemoryJobStore, Job, JobStatus, JobStore};
use chatgate::rate_limit::CounterStore;
use chatgate::StoreError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// Backend that always answers with the same text and counts calls.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    reply: Option<String>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedBackend {
    pub fn replying(reply: &str) -> Self {
        Self { reply: Some(reply.to_string()), ..Self::default() }
    }

    /// Every call fails as if the provider were down.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Option<Vec<ChatMessage>> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatReply, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        match &self.reply {
            Some(reply) => Ok(ChatReply::text(reply.clone())),
            None => Err(BackendError::Request("connection refused".into())),
        }
    }
}

/// Backend that streams `chunks` with `gap` between them, then finishes.
pub struct TricklingBackend {
    pub chunks: Vec<&'static str>,
    pub gap: Duration,
}

#[async_trait]
impl ChatBackend for TricklingBackend {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<ChatReply, BackendError> {
        Ok(ChatReply::text(self.chunks.concat()))
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        chunks: tokio::sync::mpsc::Sender<String>,
    ) -> Result<(), BackendError> {
        for chunk in &self.chunks {
            tokio::time::sleep(self.gap).await;
            if chunks.send(chunk.to_string()).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Counter store whose backend is unreachable.
/// Job store that remembers the status of every write.
#[derive(Clone, Default)]
pub struct RecordingJobStore {
    inner: InMemoryJobStore,
    writes: Arc<Mutex<Vec<JobStatus>>>,
}

impl RecordingJobStore {
    pub fn writes(&self) -> Vec<JobStatus> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for RecordingJobStore {
    async fn put(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push(job.status);
        self.inner.put(job, ttl).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        self.inner.get(job_id).await
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        self.inner.delete(job_id).await
    }
}

#[derive(Debug, Default)]
pub struct DownCounterStore;

#[async_trait]
impl CounterStore for DownCounterStore {
    async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn get_int(&self, _key: &str) -> Result<Option<i64>, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn set_int(&self, _key: &str, _value: i64, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }
}

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Capture log output of the current thread until the guard is dropped.
pub fn capture_logs() -> (Arc<Mutex<Vec<u8>>>, tracing::subscriber::DefaultGuard) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_target(true)
        .with_ansi(false)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

pub fn logs(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
}
