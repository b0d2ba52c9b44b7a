use std::collections::BTreeMap;
use std::time::Duration;

/// Transport configuration for graph backend requests.
#[derive(Debug, Clone)]
pub struct GraphApiConfig {
    /// Base URL of the orchestration backend.
    pub base_url: String,
    /// Assistant (graph) identifier submitted with every new run.
    pub assistant_id: String,
    /// Optional API key forwarded as `x-api-key`.
    pub api_key: Option<String>,
    /// Optional ambient session cookie forwarded verbatim.
    pub session_cookie: Option<String>,
    /// Additional headers merged into every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional per-request timeout for REST calls. Stream connections are
    /// never given a read timeout; a run may stay quiet for minutes.
    pub timeout: Option<Duration>,
}

impl GraphApiConfig {
    pub fn new(base_url: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            assistant_id: assistant_id.into(),
            api_key: None,
            session_cookie: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }
}
