use crate::error::GraphApiError;

/// Normalize a backend base URL: trims whitespace and trailing slashes,
/// rejects empty input.
pub fn normalize_base_url(input: &str) -> Result<String, GraphApiError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(GraphApiError::InvalidBaseUrl(
            "base URL must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn threads_path() -> &'static str {
    "/threads"
}

pub fn thread_state_path(thread_id: &str) -> String {
    format!("/threads/{}/state", thread_id.trim())
}

pub fn thread_history_path(thread_id: &str) -> String {
    format!("/threads/{}/history", thread_id.trim())
}

pub fn run_status_path(thread_id: &str, run_id: &str) -> String {
    format!("/threads/{}/runs/{}", thread_id.trim(), run_id.trim())
}

pub fn run_stream_path(thread_id: &str) -> String {
    format!("/threads/{}/runs/stream", thread_id.trim())
}

pub fn run_rejoin_path(thread_id: &str, run_id: &str) -> String {
    format!("/threads/{}/runs/{}/stream", thread_id.trim(), run_id.trim())
}
