//! Streaming state-synchronization client for agent runs on a remote
//! orchestration backend.
//!
//! Invariant: confirmed `values` events replace run state wholesale
//! (last-write-wins); nothing in this crate deep-merges snapshots.
//!
//! # Public API Overview
//! - Drive a run's lifecycle with [`StreamManager`]: start or rejoin a
//!   stream, subscribe to state changes, stop cooperatively.
//! - Coordinate thread switches, hydration, and resume policy with
//!   [`ThreadSession`] over any [`ThreadClient`].
//! - Track runs that outlive their view with [`ActiveRunRegistry`].
//! - Navigate edit-and-regenerate alternatives via
//!   [`branch_index::BranchIndex`], re-exported here.
//! - Derive progress stages from snapshot data with [`stages`].

pub mod manager;
pub mod registry;
pub mod rejoin;
pub mod session;
pub mod stages;
pub mod state;
pub mod thread_client;
pub mod ui_schema;

/// Run lifecycle state machine and its event reducer.
pub use crate::manager::{
    ListenerId, RejoinReport, StreamError, StreamManager, StreamOutcome,
};

/// Process-wide bookkeeping for runs that survive navigation.
pub use crate::registry::{ActiveRun, ActiveRunRegistry};

/// Resume policy for registered runs.
pub use crate::rejoin::{
    resume_active_run, ResumeOutcome, REJOIN_MAX_ATTEMPTS, REJOIN_RETRY_DELAY,
};

/// Conversation-level coordinator.
pub use crate::session::ThreadSession;

/// Data-driven progress stage derivation.
pub use crate::stages::{
    compute_data_driven_reveal, derive_stages, derive_stages_from_flow, dynamic_stage_defs,
    DynamicStageDef, ThoughtStage, DYNAMIC_STAGES_KEY,
};

/// Run state snapshot types.
pub use crate::state::{extract_interrupt, RunPhase, RunState, INTERRUPT_KEY};

/// Backend operations seam.
pub use crate::thread_client::ThreadClient;

/// Advisory UI payload validation.
pub use crate::ui_schema::{PermissiveUiValidator, UiSchemaValidator, ValidatedUi};

/// Checkpoint branch navigation, re-exported from its crate.
pub use branch_index::{BranchIndex, MessageBranch};

/// Transport types commonly needed alongside the session layer.
pub use graph_api::{
    CancellationSignal, CheckpointRecord, EventStream, GraphApiClient, GraphApiConfig,
    GraphApiError, Message, RunStatus, RunStreamEvent, RunSubmission, ThreadInfo,
};
