#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use thread_sync::{
    CancellationSignal, CheckpointRecord, EventStream, GraphApiError, Message, RunStatus,
    RunStreamEvent, RunSubmission, ThreadClient, ThreadInfo,
};

/// Scripted backend: each operation pops its next scripted response.
/// Hydration reads fall back to empty defaults so tests only script what
/// they assert on.
#[derive(Default)]
pub struct FakeClient {
    pub run_streams: Mutex<VecDeque<Result<Vec<RunStreamEvent>, GraphApiError>>>,
    pub rejoin_streams: Mutex<VecDeque<Result<Vec<RunStreamEvent>, GraphApiError>>>,
    pub statuses: Mutex<VecDeque<Result<RunStatus, GraphApiError>>>,
    pub states: Mutex<VecDeque<Result<Value, GraphApiError>>>,
    pub histories: Mutex<VecDeque<Result<Vec<CheckpointRecord>, GraphApiError>>>,
    pub thread_ids: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_run_stream(&self, events: Vec<RunStreamEvent>) {
        lock(&self.run_streams).push_back(Ok(events));
    }

    pub fn script_rejoin_stream(&self, events: Vec<RunStreamEvent>) {
        lock(&self.rejoin_streams).push_back(Ok(events));
    }

    pub fn script_rejoin_failure(&self, message: &str) {
        lock(&self.rejoin_streams).push_back(Err(GraphApiError::Protocol(message.to_string())));
    }

    pub fn script_status(&self, status: RunStatus) {
        lock(&self.statuses).push_back(Ok(status));
    }

    pub fn script_status_failure(&self, message: &str) {
        lock(&self.statuses).push_back(Err(GraphApiError::Protocol(message.to_string())));
    }

    pub fn script_state(&self, values: Value) {
        lock(&self.states).push_back(Ok(values));
    }

    pub fn script_history(&self, history: Vec<CheckpointRecord>) {
        lock(&self.histories).push_back(Ok(history));
    }

    pub fn calls(&self, op: &str) -> usize {
        lock(&self.calls).iter().filter(|name| *name == op).count()
    }

    fn record(&self, op: &str) {
        lock(&self.calls).push(op.to_string());
    }
}

impl ThreadClient for FakeClient {
    async fn create_thread(&self) -> Result<ThreadInfo, GraphApiError> {
        self.record("create_thread");
        let thread_id = lock(&self.thread_ids)
            .pop_front()
            .unwrap_or_else(|| "thread-fake".to_string());
        Ok(ThreadInfo { thread_id })
    }

    async fn get_state(&self, _thread_id: &str) -> Result<Value, GraphApiError> {
        self.record("get_state");
        lock(&self.states).pop_front().unwrap_or(Ok(Value::Null))
    }

    async fn get_history(
        &self,
        _thread_id: &str,
    ) -> Result<Vec<CheckpointRecord>, GraphApiError> {
        self.record("get_history");
        lock(&self.histories).pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn get_run_status(
        &self,
        _thread_id: &str,
        _run_id: &str,
    ) -> Result<RunStatus, GraphApiError> {
        self.record("get_run_status");
        lock(&self.statuses)
            .pop_front()
            .unwrap_or(Err(GraphApiError::Protocol("unscripted status".into())))
    }

    async fn open_run_stream(
        &self,
        _thread_id: &str,
        _submission: RunSubmission,
        _cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, GraphApiError> {
        self.record("open_run_stream");
        lock(&self.run_streams)
            .pop_front()
            .unwrap_or(Err(GraphApiError::Protocol("unscripted run stream".into())))
            .map(EventStream::from_events)
    }

    async fn open_rejoin_stream(
        &self,
        _thread_id: &str,
        _run_id: &str,
        _cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, GraphApiError> {
        self.record("open_rejoin_stream");
        lock(&self.rejoin_streams)
            .pop_front()
            .unwrap_or(Err(GraphApiError::Protocol(
                "unscripted rejoin stream".into(),
            )))
            .map(EventStream::from_events)
    }
}

pub fn checkpoint(
    checkpoint_id: &str,
    parent_checkpoint_id: Option<&str>,
    message_ids: &[&str],
) -> CheckpointRecord {
    CheckpointRecord {
        checkpoint_id: checkpoint_id.to_string(),
        parent_checkpoint_id: parent_checkpoint_id.map(str::to_string),
        messages: message_ids
            .iter()
            .map(|id| Message {
                id: (*id).to_string(),
                role: Some("user".to_string()),
                content: Value::String(format!("msg {id}")),
            })
            .collect(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
