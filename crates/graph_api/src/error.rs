use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// Connection could not be opened or dropped unexpectedly mid-stream.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// REST or stream-open request returned a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: StatusCode, message: String },

    /// Wire data that should have parsed did not.
    #[error("malformed wire payload: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("request was cancelled")]
    Cancelled,

    #[error("retry exhausted after {attempts} attempts (last error: {last_error:?})")]
    RetryExhausted {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl GraphApiError {
    /// True for the cooperative-cancellation sentinel, which callers treat
    /// as stream end rather than failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Error body shapes the backend is known to emit. Some endpoints wrap the
/// message under `error`, others use a bare `detail` field.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorBodyFields>,
    detail: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBodyFields {
    message: Option<String>,
}

/// Extract a human-readable message from an error response body, falling
/// back to the raw body and then the status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let nested = parsed.error.and_then(|fields| fields.message);
        if let Some(message) = first_non_empty([nested, parsed.detail, parsed.message]) {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

fn first_non_empty(candidates: [Option<String>; 3]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
}
