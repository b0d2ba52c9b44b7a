use std::collections::VecDeque;
use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, COOKIE};
use reqwest::{Client, Method, RequestBuilder, Response};

use crate::config::GraphApiConfig;
use crate::error::{parse_error_message, GraphApiError};
use crate::events::{RunStatus, RunStreamEvent};
use crate::payload::{
    CheckpointRecord, RunStatusResponse, RunStreamBody, RunSubmission, ThreadInfo,
    ThreadStateResponse, STREAM_MODES,
};
use crate::retry::{is_retryable_http_error, open_retry_delay, MAX_OPEN_RETRIES};
use crate::sse::SseStreamParser;
use crate::url::{
    normalize_base_url, run_rejoin_path, run_status_path, run_stream_path, thread_history_path,
    thread_state_path, threads_path,
};

/// Cooperative cancellation flag shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// REST facade and event-stream opener for the orchestration backend.
///
/// Holds no cross-call state beyond the connection pool; every call hits
/// the network and callers own retry policy for REST operations.
#[derive(Debug)]
pub struct GraphApiClient {
    http: Client,
    config: GraphApiConfig,
    base_url: String,
}

impl GraphApiClient {
    pub fn new(config: GraphApiConfig) -> Result<Self, GraphApiError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let http = Client::builder().build().map_err(GraphApiError::from)?;
        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    pub fn config(&self) -> &GraphApiConfig {
        &self.config
    }

    pub fn assistant_id(&self) -> &str {
        &self.config.assistant_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn headers(&self) -> Result<HeaderMap, GraphApiError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = self.config.api_key.as_deref() {
            headers.insert(
                HeaderName::from_static("x-api-key"),
                header_value("x-api-key", api_key)?,
            );
        }
        if let Some(cookie) = self.config.session_cookie.as_deref() {
            headers.insert(COOKIE, header_value("cookie", cookie)?);
        }
        for (key, value) in &self.config.extra_headers {
            headers.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    GraphApiError::InvalidBaseUrl(format!("invalid header key: {key}"))
                })?,
                header_value(key, value)?,
            );
        }
        Ok(headers)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GraphApiError> {
        let mut builder = self
            .http
            .request(method, self.endpoint(path))
            .headers(self.headers()?);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    /// `POST /threads`: create a fresh conversation thread.
    pub async fn create_thread(&self) -> Result<ThreadInfo, GraphApiError> {
        let response = self
            .request(Method::POST, threads_path())?
            .json(&serde_json::json!({}))
            .send()
            .await?;
        decode_json_response(response).await
    }

    /// `GET /threads/{id}/state`: current authoritative snapshot.
    pub async fn get_state(&self, thread_id: &str) -> Result<serde_json::Value, GraphApiError> {
        let response = self
            .request(Method::GET, &thread_state_path(thread_id))?
            .send()
            .await?;
        let state: ThreadStateResponse = decode_json_response(response).await?;
        Ok(state.values)
    }

    /// `GET /threads/{id}/history`: persisted checkpoint records, in
    /// traversal order.
    pub async fn get_history(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointRecord>, GraphApiError> {
        let response = self
            .request(Method::GET, &thread_history_path(thread_id))?
            .send()
            .await?;
        decode_json_response(response).await
    }

    /// `GET /threads/{id}/runs/{runId}`: lifecycle status of one run.
    pub async fn get_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunStatus, GraphApiError> {
        let response = self
            .request(Method::GET, &run_status_path(thread_id, run_id))?
            .send()
            .await?;
        let status: RunStatusResponse = decode_json_response(response).await?;
        Ok(status.status)
    }

    /// Open an event stream for a new run on `thread_id`.
    ///
    /// Transient HTTP failures of the opening POST are retried a bounded
    /// number of times; once the stream is open no reconnection happens at
    /// this layer.
    pub async fn open_run_stream(
        &self,
        thread_id: &str,
        submission: RunSubmission,
        cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, GraphApiError> {
        let body = RunStreamBody {
            assistant_id: &self.config.assistant_id,
            input: &submission.input,
            command: submission.command.as_ref(),
            checkpoint_id: submission.checkpoint_id.as_deref(),
            stream_mode: &STREAM_MODES,
            stream_subgraphs: true,
            stream_resumable: true,
        };
        let path = run_stream_path(thread_id);
        let mut last_error = None;

        for attempt in 0..=MAX_OPEN_RETRIES {
            if is_cancelled(cancellation.as_ref()) {
                return Err(GraphApiError::Cancelled);
            }

            let send = self
                .stream_request(Method::POST, &path)?
                .json(&body)
                .send();
            let response = await_or_cancel(send, cancellation.as_ref()).await?;

            match response {
                Ok(response) if response.status().is_success() => {
                    return Ok(EventStream::new(response, cancellation));
                }
                Ok(response) => {
                    let status = response.status();
                    let body_text = await_or_cancel(response.text(), cancellation.as_ref())
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body_text);
                    last_error = Some(message.clone());

                    if attempt < MAX_OPEN_RETRIES
                        && is_retryable_http_error(status.as_u16(), &body_text)
                    {
                        await_or_cancel(
                            tokio::time::sleep(open_retry_delay(attempt)),
                            cancellation.as_ref(),
                        )
                        .await?;
                        continue;
                    }
                    return Err(GraphApiError::Http { status, message });
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt < MAX_OPEN_RETRIES {
                        await_or_cancel(
                            tokio::time::sleep(open_retry_delay(attempt)),
                            cancellation.as_ref(),
                        )
                        .await?;
                        continue;
                    }
                    return Err(GraphApiError::Transport(error));
                }
            }
        }

        Err(GraphApiError::RetryExhausted {
            attempts: MAX_OPEN_RETRIES + 1,
            last_error,
        })
    }

    /// Open a rejoin stream for an already-started run.
    ///
    /// No input is sent and no open-retry happens here: the rejoin retry
    /// budget belongs to the caller's policy, which must observe every
    /// zero-event connection individually.
    pub async fn open_rejoin_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, GraphApiError> {
        if is_cancelled(cancellation.as_ref()) {
            return Err(GraphApiError::Cancelled);
        }

        let send = self
            .stream_request(Method::GET, &run_rejoin_path(thread_id, run_id))?
            .query(&[
                ("stream_mode", STREAM_MODES[0]),
                ("stream_mode", STREAM_MODES[1]),
                ("stream_subgraphs", "true"),
                ("stream_resumable", "true"),
            ])
            .send();
        let response = await_or_cancel(send, cancellation.as_ref()).await??;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = await_or_cancel(response.text(), cancellation.as_ref())
                .await?
                .unwrap_or_default();
            return Err(GraphApiError::Http {
                status,
                message: parse_error_message(status, &body_text),
            });
        }

        Ok(EventStream::new(response, cancellation))
    }

    fn stream_request(&self, method: Method, path: &str) -> Result<RequestBuilder, GraphApiError> {
        // No timeout: a run may stay quiet between events for a long time.
        Ok(self
            .http
            .request(method, self.endpoint(path))
            .headers(self.headers()?)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream")))
    }
}

/// Cancelable, ordered sequence of [`RunStreamEvent`]s over one connection.
///
/// Cancellation closes the connection and ends the sequence without
/// raising; events already parsed from received bytes are still drained
/// first.
pub struct EventStream {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    parser: SseStreamParser,
    pending: VecDeque<RunStreamEvent>,
    cancellation: Option<CancellationSignal>,
    done: bool,
}

impl EventStream {
    fn new(response: Response, cancellation: Option<CancellationSignal>) -> Self {
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Self {
            bytes,
            parser: SseStreamParser::default(),
            pending: VecDeque::new(),
            cancellation,
            done: false,
        }
    }

    /// Build an event stream from a fixed event list. Test seam; no network.
    pub fn from_events(events: Vec<RunStreamEvent>) -> Self {
        Self {
            bytes: futures_util::stream::empty().boxed(),
            parser: SseStreamParser::default(),
            pending: events.into(),
            cancellation: None,
            done: true,
        }
    }

    /// Next event in strict arrival order; `Ok(None)` means the sequence
    /// ended (server close, terminal frame already drained, or cancel).
    pub async fn next_event(&mut self) -> Result<Option<RunStreamEvent>, GraphApiError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }
            if is_cancelled(self.cancellation.as_ref()) {
                self.done = true;
                return Ok(None);
            }

            let chunk = match await_or_cancel(self.bytes.next(), self.cancellation.as_ref()).await
            {
                Ok(chunk) => chunk,
                Err(GraphApiError::Cancelled) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(error) => return Err(error),
            };

            match chunk {
                Some(Ok(bytes)) => {
                    self.pending.extend(self.parser.feed(&bytes));
                }
                Some(Err(error)) => {
                    self.done = true;
                    return Err(GraphApiError::Transport(error));
                }
                None => {
                    self.done = true;
                }
            }
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("pending", &self.pending.len())
            .field("done", &self.done)
            .finish()
    }
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue, GraphApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| GraphApiError::InvalidBaseUrl(format!("invalid header value for {key}")))
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn decode_json_response<T>(response: Response) -> Result<T, GraphApiError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes);
        return Err(GraphApiError::Http {
            status,
            message: parse_error_message(status, &body),
        });
    }

    serde_json::from_slice::<T>(&bytes).map_err(GraphApiError::from)
}

/// Drive `future` while polling the cancellation flag. The flag wins any
/// race: a result that completes in the same poll window as a cancel is
/// discarded.
async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, GraphApiError>
where
    F: Future,
{
    let Some(token) = cancellation else {
        return Ok(future.await);
    };
    tokio::pin!(future);

    loop {
        if token.load(Ordering::Acquire) {
            return Err(GraphApiError::Cancelled);
        }
        match tokio::time::timeout(CANCEL_POLL_INTERVAL, future.as_mut()).await {
            Ok(_output) if token.load(Ordering::Acquire) => {
                return Err(GraphApiError::Cancelled);
            }
            Ok(output) => return Ok(output),
            Err(_elapsed) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fixed_event_stream_preserves_order() {
        let mut stream = EventStream::from_events(vec![
            RunStreamEvent::Values {
                snapshot: json!({"a": 1}),
            },
            RunStreamEvent::End,
        ]);

        assert_eq!(
            stream.next_event().await.unwrap(),
            Some(RunStreamEvent::Values {
                snapshot: json!({"a": 1}),
            })
        );
        assert_eq!(stream.next_event().await.unwrap(), Some(RunStreamEvent::End));
        assert_eq!(stream.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_future_reports_cancellation() {
        let token: CancellationSignal = Arc::new(AtomicBool::new(true));
        let result = await_or_cancel(std::future::pending::<()>(), Some(&token)).await;
        assert!(matches!(result, Err(GraphApiError::Cancelled)));
    }

    #[derive(Debug, serde::Deserialize)]
    struct Probe {
        value: u32,
    }

    #[tokio::test]
    async fn decode_rejects_non_success_with_parsed_message() {
        let response = http_response(404, r#"{"detail":"thread not found"}"#);
        let result = decode_json_response::<Probe>(response).await;
        match result {
            Err(GraphApiError::Http { status, message }) => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert_eq!(message, "thread not found");
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn decode_parses_success_body() {
        let response = http_response(200, r#"{"value":7}"#);
        let probe = decode_json_response::<Probe>(response).await.unwrap();
        assert_eq!(probe.value, 7);
    }

    fn http_response(status: u16, body: &str) -> Response {
        Response::from(
            http::Response::builder()
                .status(status)
                .body(body.to_string())
                .expect("response build"),
        )
    }
}
