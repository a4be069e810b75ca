#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # chatgate
//!
//! Admission control and an asynchronous job pipeline for chat APIs.
//!
//! ## Features
//!
//! - **Rate limiting**: fixed-window counters and token buckets over a shared
//!   [`CounterStore`](rate_limit::CounterStore)
//! - **Admission gate**: per-operation policies keyed by client IP, user or
//!   globally, usable directly or as a Tower layer
//! - **Token revocation** with expiry taken from the token itself
//! - **Async jobs**: submit, status, result, long poll and cancel, with
//!   at-least-once workers behind a [`JobQueue`](jobs::JobQueue)
//! - **Chat service**: synchronous replies with an offline fallback and
//!   streaming with an idle timeout
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatgate::backend::{BackendError, ChatBackend, ChatMessage, ChatReply};
//! use chatgate::chat::ChatRequest;
//! use chatgate::jobs::{ChannelJobQueue, InMemoryJobStore, JobPipeline, PollOutcome, WorkerPool};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ChatBackend for Echo {
//!     async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatReply, BackendError> {
//!         let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
//!         Ok(ChatReply::text(last))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chatgate::GateError> {
//!     let pipeline = Arc::new(JobPipeline::new(
//!         Arc::new(InMemoryJobStore::new()),
//!         Arc::new(ChannelJobQueue::default()),
//!         Arc::new(Echo),
//!     ));
//!     let _workers = WorkerPool::spawn(pipeline.clone(), 4);
//!
//!     let job_id = pipeline.submit("alice", ChatRequest::new("hello")).await?;
//!     if let PollOutcome::Finished(job) = pipeline.poll(&job_id, None).await? {
//!         println!("{:?}: {:?}", job.status, job.result);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adaptive;
pub mod admission;
pub mod backend;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod jobs;
pub mod prelude;
pub mod rate_limit;
pub mod revocation;
pub mod sleeper;
pub mod sweeper;
pub mod telemetry;

// Re-exports
pub use adaptive::DynamicConfig;
pub use admission::{AdmissionGate, AdmissionPolicy, PolicyTable, RequestContext};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, GateConfig};
pub use error::{AdmissionError, GateError, StoreError};
pub use jobs::{Job, JobPipeline, JobStatus};
pub use rate_limit::{RateLimitKey, RateLimiter, Scope};
pub use revocation::RevocationStore;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use sweeper::{Sweep, SweeperHandle};
