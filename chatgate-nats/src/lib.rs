//! NATS job queue for `chatgate` (optional companion crate).
//!
//! Jobs are published as JSON to one subject and consumed through a queue
//! group, so each job goes to one worker across all processes. Default build
//! carries no client and fails every call; enable the `client` feature to
//! actually talk to NATS.
//!
//! ```toml
//! chatgate-nats = { version = "0.1", features = ["client"] }
//! ```
//!
//! ```rust,ignore
//! use chatgate_nats::NatsJobQueue;
//! # async fn demo() -> Result<(), chatgate::StoreError> {
//! let queue = NatsJobQueue::connect("nats://127.0.0.1:4222", "chat.jobs", "chat-workers").await?;
//! # Ok(()) }
//! ```
//!
//! Core NATS delivers at most once: a job published while no worker is
//! subscribed is lost and stays `PENDING` until its record expires. Callers
//! that poll see a timeout in that case.

use async_trait::async_trait;
use chatgate::jobs::{Job, JobQueue};
use chatgate::StoreError;
#[cfg(feature = "client")]
use tracing::debug;
use tracing::warn;

pub const DEFAULT_SUBJECT: &str = "chat.jobs";
pub const DEFAULT_QUEUE_GROUP: &str = "chat-workers";

pub struct NatsJobQueue {
    subject: String,
    group: String,
    #[cfg(feature = "client")]
    client: nats::asynk::Connection,
    /// Subscribed on first `receive`, so submit-only processes never join
    /// the queue group.
    #[cfg(feature = "client")]
    subscription: tokio::sync::OnceCell<nats::asynk::Subscription>,
}

impl std::fmt::Debug for NatsJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsJobQueue")
            .field("subject", &self.subject)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl NatsJobQueue {
    pub async fn connect(
        server: &str,
        subject: impl Into<String>,
        group: impl Into<String>,
    ) -> Result<Self, StoreError> {
        #[cfg(feature = "client")]
        {
            let client = nats::asynk::connect(server)
                .await
                .map_err(|e| StoreError::unavailable(format!("nats connect failed: {e}")))?;
            return Ok(Self::from_connection(client, subject, group));
        }
        #[cfg(not(feature = "client"))]
        {
            let _ = server; // unused
            Ok(Self { subject: subject.into(), group: group.into() })
        }
    }

    #[cfg(feature = "client")]
    pub fn from_connection(
        client: nats::asynk::Connection,
        subject: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            group: group.into(),
            client,
            subscription: tokio::sync::OnceCell::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    #[cfg(feature = "client")]
    async fn subscription(&self) -> Result<&nats::asynk::Subscription, StoreError> {
        self.subscription
            .get_or_try_init(|| async {
                debug!(target: "chatgate::nats", subject = %self.subject, group = %self.group, "joining queue group");
                self.client
                    .queue_subscribe(&self.subject, &self.group)
                    .await
                    .map_err(|e| StoreError::unavailable(format!("nats subscribe failed: {e}")))
            })
            .await
    }
}

#[async_trait]
impl JobQueue for NatsJobQueue {
    async fn publish(&self, job: &Job) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(job)?;
        #[cfg(feature = "client")]
        {
            return self
                .client
                .publish(&self.subject, payload)
                .await
                .map_err(|e| StoreError::unavailable(format!("nats publish failed: {e}")));
        }
        #[cfg(not(feature = "client"))]
        {
            let _ = payload;
            Err(client_disabled())
        }
    }

    async fn receive(&self) -> Result<Option<Job>, StoreError> {
        #[cfg(feature = "client")]
        {
            let subscription = self.subscription().await?;
            loop {
                let Some(message) = subscription.next().await else {
                    return Ok(None);
                };
                match serde_json::from_slice::<Job>(&message.data) {
                    Ok(job) => return Ok(Some(job)),
                    // A malformed message can never succeed; drop it and keep consuming.
                    Err(err) => {
                        warn!(target: "chatgate::nats", subject = %self.subject, error = %err, "discarding malformed job message")
                    }
                }
            }
        }
        #[cfg(not(feature = "client"))]
        {
            Err(client_disabled())
        }
    }
}

#[cfg(not(feature = "client"))]
fn client_disabled() -> StoreError {
    warn!(target: "chatgate::nats", "chatgate-nats built without the `client` feature");
    StoreError::unavailable("chatgate-nats built without the `client` feature")
}
