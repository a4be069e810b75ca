//! Convenient re-exports for wiring a gate and a pipeline together.
pub use crate::{
    admission::{
        AdmissionGate, AdmissionPolicy, FailureMode, PolicyAlgorithm, PolicyTable, RequestContext,
        CHAT_COMPLETIONS,
    },
    backend::{BackendError, ChatBackend, ChatMessage, ChatReply, HistorySink, Role},
    chat::{ChatOutcome, ChatRequest, ChatService, StreamEvent},
    config::GateConfig,
    error::{AdmissionError, GateError, StoreError},
    jobs::{
        CancelOutcome, ChannelJobQueue, InMemoryJobStore, Job, JobPipeline, JobQueue, JobStatus,
        JobStore, PollOutcome, WorkerPool,
    },
    rate_limit::{
        AdmissionLayer, Algorithm, CounterStore, InMemoryCounterStore, RateLimitKey, RateLimiter,
        Scope,
    },
    revocation::RevocationStore,
    sweeper::{Sweep, SweeperHandle},
    telemetry::{GateEvent, LogSink, MemorySink, NullSink, TelemetrySink},
};
