//! Structured events for admission decisions and job lifecycles.
//!
//! Everything also goes to `tracing`; sinks exist for consumers that want the
//! events as values (metrics bridges, audit logs, tests).
//!
//! ```rust
//! use chatgate::telemetry::{AdmissionEvent, GateEvent};
//!
//! let event = GateEvent::from(AdmissionEvent::Admitted {
//!     operation: "chat.completions".into(),
//!     key: "user:alice".into(),
//!     remaining: 4,
//! });
//! assert!(event.to_string().starts_with("Admission::Admitted"));
//! ```

pub mod events;
pub mod sinks;

pub use events::{AdmissionEvent, GateEvent, JobEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, SinkFuture, TelemetrySink};
