use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::RunStatus;

/// Caller-provided parameters for starting a new run on a thread.
#[derive(Debug, Clone, Default)]
pub struct RunSubmission {
    /// Graph input for the run.
    pub input: Value,
    /// Optional resume command (interrupt reply, goto, etc.).
    pub command: Option<Value>,
    /// Optional checkpoint to fork from (edit-and-regenerate).
    pub checkpoint_id: Option<String>,
}

impl RunSubmission {
    pub fn new(input: impl Into<Value>) -> Self {
        Self {
            input: input.into(),
            command: None,
            checkpoint_id: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<Value>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn from_checkpoint(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }
}

/// Wire body for the run-stream POST.
#[derive(Debug, Serialize)]
pub(crate) struct RunStreamBody<'a> {
    pub assistant_id: &'a str,
    pub input: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<&'a str>,
    pub stream_mode: &'a [&'a str],
    pub stream_subgraphs: bool,
    pub stream_resumable: bool,
}

/// Stream modes requested on every connection, new run or rejoin.
pub(crate) const STREAM_MODES: [&str; 2] = ["values", "custom"];

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadInfo {
    pub thread_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadStateResponse {
    #[serde(default)]
    pub values: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunStatusResponse {
    pub status: RunStatus,
}

/// One persisted step of the backend graph's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub checkpoint_id: String,
    #[serde(default)]
    pub parent_checkpoint_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Message as persisted inside a checkpoint. Content stays opaque; the
/// client never interprets domain semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Value,
}
