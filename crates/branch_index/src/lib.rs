//! Per-message branch metadata derived from checkpoint history.
//!
//! After an edit-and-regenerate, a thread's checkpoint history forks:
//! several checkpoints share one parent, and a message id can appear in
//! more than one of them. This crate rebuilds, from the ordered history,
//! the map a UI needs to offer "previous/next version" navigation.
//!
//! The index is rebuilt from scratch on every update and swapped in
//! atomically; readers always observe either the previous index or the new
//! one in full, never a mix.

mod index;

pub use index::{BranchIndex, MessageBranch};
