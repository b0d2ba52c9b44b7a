//! Transport-only client primitives for the agent orchestration backend.
//!
//! This crate owns the wire-level concerns of talking to a graph backend:
//! opening run event streams (new run or rejoin of an existing run), parsing
//! the SSE wire format into typed events, and the REST thread-lifecycle
//! calls (create thread, state snapshot, checkpoint history, run status).
//!
//! It intentionally contains no run lifecycle policy. Reconnect/rejoin
//! decisions, retry budgets for interrupted runs, and state reduction all
//! live with the caller; the transport reports what the wire said and
//! nothing more. The one local policy is bounded retry of the initial
//! stream-opening POST for transient HTTP failures, before any event has
//! been observed.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, EventStream, GraphApiClient};
pub use config::GraphApiConfig;
pub use error::GraphApiError;
pub use events::{RunStatus, RunStreamEvent};
pub use payload::{CheckpointRecord, Message, RunSubmission, ThreadInfo};
pub use sse::SseStreamParser;
pub use url::normalize_base_url;
