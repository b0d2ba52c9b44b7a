use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a run as reported by the REST status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Error,
    Timeout,
}

impl RunStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "success" => Self::Success,
            "error" => Self::Error,
            "timeout" => Self::Timeout,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    /// Terminal statuses mean the backend will emit no further events for
    /// the run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Timeout)
    }
}

/// Stream event emitted by the SSE parser after normalization.
///
/// Events are yielded in strict wire arrival order within one connection.
/// Malformed payloads of a known event kind surface as [`RunStreamEvent::Error`]
/// rather than a parse failure, so stream policy stays with the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStreamEvent {
    /// Full authoritative state snapshot; replaces any prior snapshot.
    Values { snapshot: Value },
    /// Opaque passthrough payload for an external renderer.
    Custom { payload: Value },
    /// Run bookkeeping; carries the server-assigned run id when present.
    Metadata {
        run_id: Option<String>,
        raw: Value,
    },
    /// Backend-reported stream failure.
    Error { message: String },
    /// Explicit end-of-run marker.
    End,
}

impl RunStreamEvent {
    /// Events after which the backend closes the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::End)
    }
}
