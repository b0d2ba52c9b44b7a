use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use graph_api::{CancellationSignal, EventStream, GraphApiError, RunStreamEvent};
use serde_json::Value;
use thiserror::Error;

use crate::registry::ActiveRunRegistry;
use crate::state::{extract_interrupt, RunPhase, RunState};
use crate::ui_schema::{PermissiveUiValidator, UiSchemaValidator};

/// Callback invoked after every state mutation.
pub type Listener = Box<dyn Fn(&RunState) + Send + Sync>;
/// Callback receiving `custom` events verbatim; they are never retained.
pub type CustomEventHandler = Box<dyn Fn(&Value) + Send + Sync>;

/// Handle for removing a subscribed listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("a stream is already active for this thread")]
    AlreadyActive,
    /// The backend reported the run failed via an `error` event.
    #[error("run failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Transport(#[from] GraphApiError),
}

/// How a driven stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Natural completion: terminal frame or clean server close. The
    /// caller may unregister the active run.
    Completed,
    /// The cancellation token fired. The backend run continues unattended
    /// and stays registered.
    Cancelled,
}

/// Result of one rejoin connection. `events == 0` is the ambiguous case
/// the rejoin policy must disambiguate via the run-status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejoinReport {
    pub outcome: StreamOutcome,
    pub events: usize,
}

#[derive(Debug, Clone, Copy)]
enum DriveMode {
    Start,
    Rejoin,
}

enum Reduced {
    Continue,
    Ended,
    Failed(String),
}

/// Run lifecycle state machine for one thread.
///
/// Owns the authoritative state snapshot, feeds stream events through the
/// reducer, and notifies subscribers after every mutation. One instance
/// exists per open thread; instances share the injected
/// [`ActiveRunRegistry`].
pub struct StreamManager {
    thread_id: String,
    registry: Arc<ActiveRunRegistry>,
    state: Mutex<RunState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
    cancel: Mutex<Option<CancellationSignal>>,
    on_custom: Option<CustomEventHandler>,
    ui_validator: Arc<dyn UiSchemaValidator>,
    optimistic: AtomicBool,
}

impl StreamManager {
    pub fn new(thread_id: impl Into<String>, registry: Arc<ActiveRunRegistry>) -> Self {
        Self {
            thread_id: thread_id.into(),
            registry,
            state: Mutex::new(RunState::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            cancel: Mutex::new(None),
            on_custom: None,
            ui_validator: Arc::new(PermissiveUiValidator),
            optimistic: AtomicBool::new(false),
        }
    }

    pub fn with_custom_handler(
        mut self,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Self {
        self.on_custom = Some(Box::new(handler));
        self
    }

    pub fn with_ui_validator(mut self, validator: Arc<dyn UiSchemaValidator>) -> Self {
        self.ui_validator = validator;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn registry(&self) -> &Arc<ActiveRunRegistry> {
        &self.registry
    }

    /// Clone of the current run state.
    pub fn snapshot(&self) -> RunState {
        self.lock_state().clone()
    }

    /// True while the current `values` carry an unconfirmed local mutation.
    pub fn has_optimistic(&self) -> bool {
        self.optimistic.load(Ordering::Acquire)
    }

    /// Register a listener invoked after every state mutation.
    pub fn subscribe(&self, listener: impl Fn(&RunState) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.lock_listeners().retain(|(known, _)| *known != id);
    }

    /// Replace `values` with `mutator(values)` synchronously. The result is
    /// provisional: the next confirmed `values` event supersedes it in full
    /// and it is never re-applied.
    pub fn apply_optimistic<F>(&self, mutator: F)
    where
        F: FnOnce(Value) -> Value,
    {
        {
            let mut state = self.lock_state();
            let current = std::mem::take(&mut state.values);
            state.values = mutator(current);
            state.interrupt = extract_interrupt(&state.values);
        }
        self.optimistic.store(true, Ordering::Release);
        self.notify();
    }

    /// Fire the cancellation token for the in-flight sequence, if any.
    /// Idempotent; never unregisters the active run.
    pub fn stop(&self) {
        if let Some(token) = self.lock_cancel().as_ref() {
            token.store(true, Ordering::Release);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.lock_cancel()
            .as_ref()
            .is_some_and(|token| token.load(Ordering::Acquire))
    }

    /// If the current token has fired, settle the phase back to idle.
    /// Returns whether a stop was observed.
    pub(crate) fn settle_if_stopped(&self) -> bool {
        if self.is_stopped() {
            self.enter_idle_phase();
            true
        } else {
            false
        }
    }

    /// Settle the phase back to idle without touching values.
    pub(crate) fn settle_idle(&self) {
        self.enter_idle_phase();
    }

    /// Install the given snapshot as confirmed state and return to idle.
    /// Used when a run is discovered to have finished while disconnected.
    pub fn refresh_from_snapshot(&self, values: Value) {
        self.optimistic.store(false, Ordering::Release);
        self.mutate(|state| {
            state.values = values;
            state.interrupt = extract_interrupt(&state.values);
            state.error = None;
            state.phase = RunPhase::Idle;
        });
    }

    /// Start a new run. `open` receives a fresh cancellation token and
    /// yields the event sequence; every event feeds the reducer.
    ///
    /// Returns [`StreamOutcome::Cancelled`] when the sequence ended because
    /// the token fired, [`StreamOutcome::Completed`] on natural completion.
    pub async fn start<F, Fut>(&self, open: F) -> Result<StreamOutcome, StreamError>
    where
        F: FnOnce(CancellationSignal) -> Fut,
        Fut: Future<Output = Result<EventStream, GraphApiError>>,
    {
        self.begin_start()?;
        let cancel = self.replace_token();

        let stream = match open(Arc::clone(&cancel)).await {
            Ok(stream) => stream,
            Err(error) if error.is_cancelled() => {
                self.enter_idle_phase();
                return Ok(StreamOutcome::Cancelled);
            }
            Err(error) => {
                self.fail(error.to_string());
                return Err(StreamError::Transport(error));
            }
        };

        let (outcome, _events) = self.drive(stream, &cancel, DriveMode::Start).await?;
        Ok(outcome)
    }

    /// Rejoin an already-started run through the same reducer path.
    ///
    /// A connection that fails to open, or closes before yielding a single
    /// event, is NOT treated as an error here: it reports zero events and
    /// leaves the phase at `Rejoining`, so the rejoin policy can
    /// disambiguate via the run-status endpoint.
    pub async fn rejoin<F, Fut>(&self, open: F) -> Result<RejoinReport, StreamError>
    where
        F: FnOnce(CancellationSignal) -> Fut,
        Fut: Future<Output = Result<EventStream, GraphApiError>>,
    {
        self.begin_rejoin()?;
        let cancel = self.replace_token();

        let stream = match open(Arc::clone(&cancel)).await {
            Ok(stream) => stream,
            Err(error) if error.is_cancelled() => {
                self.enter_idle_phase();
                return Ok(RejoinReport {
                    outcome: StreamOutcome::Cancelled,
                    events: 0,
                });
            }
            Err(error) => {
                tracing::warn!(thread_id = %self.thread_id, %error, "rejoin connection could not be opened");
                return Ok(RejoinReport {
                    outcome: StreamOutcome::Completed,
                    events: 0,
                });
            }
        };

        let (outcome, events) = self.drive(stream, &cancel, DriveMode::Rejoin).await?;
        Ok(RejoinReport { outcome, events })
    }

    async fn drive(
        &self,
        mut stream: EventStream,
        cancel: &CancellationSignal,
        mode: DriveMode,
    ) -> Result<(StreamOutcome, usize), StreamError> {
        let mut events = 0usize;

        loop {
            match stream.next_event().await {
                Ok(Some(event)) => {
                    events += 1;
                    match self.reduce(event) {
                        Reduced::Continue => {}
                        Reduced::Ended => return Ok((StreamOutcome::Completed, events)),
                        Reduced::Failed(message) => return Err(StreamError::Backend(message)),
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    if matches!(mode, DriveMode::Rejoin) && events == 0 {
                        tracing::warn!(thread_id = %self.thread_id, %error, "rejoin connection lost before any event");
                        return Ok((StreamOutcome::Completed, 0));
                    }
                    self.fail(error.to_string());
                    return Err(StreamError::Transport(error));
                }
            }
        }

        if cancel.load(Ordering::Acquire) {
            self.enter_idle_phase();
            return Ok((StreamOutcome::Cancelled, events));
        }

        match mode {
            // A zero-event rejoin close keeps the phase at Rejoining; the
            // user keeps seeing "working" while the policy re-checks.
            DriveMode::Rejoin if events == 0 => Ok((StreamOutcome::Completed, 0)),
            _ => {
                self.finish_naturally();
                Ok((StreamOutcome::Completed, events))
            }
        }
    }

    fn reduce(&self, event: RunStreamEvent) -> Reduced {
        match event {
            RunStreamEvent::Values { snapshot } => {
                self.validate_ui(&snapshot);
                self.optimistic.store(false, Ordering::Release);
                self.mutate(|state| {
                    state.values = snapshot;
                    state.interrupt = extract_interrupt(&state.values);
                    state.error = None;
                    if matches!(state.phase, RunPhase::Connecting | RunPhase::Rejoining) {
                        state.phase = RunPhase::Streaming;
                    }
                });
                Reduced::Continue
            }
            RunStreamEvent::Custom { payload } => {
                self.promote_to_streaming();
                if let Some(handler) = &self.on_custom {
                    handler(&payload);
                }
                Reduced::Continue
            }
            RunStreamEvent::Metadata { run_id, .. } => {
                self.promote_to_streaming();
                if let Some(run_id) = run_id {
                    self.registry.register(&self.thread_id, &run_id);
                }
                Reduced::Continue
            }
            RunStreamEvent::Error { message } => {
                self.fail(message.clone());
                Reduced::Failed(message)
            }
            RunStreamEvent::End => {
                self.mutate(|state| {
                    state.phase = RunPhase::Idle;
                    // Keep the marker only if the final snapshot still
                    // carries one: paused-for-input runs end this way.
                    state.interrupt = extract_interrupt(&state.values);
                });
                Reduced::Ended
            }
        }
    }

    fn begin_start(&self) -> Result<(), StreamError> {
        {
            let mut state = self.lock_state();
            if state.phase.is_active() {
                return Err(StreamError::AlreadyActive);
            }
            state.phase = RunPhase::Connecting;
            state.error = None;
        }
        self.notify();
        Ok(())
    }

    fn begin_rejoin(&self) -> Result<(), StreamError> {
        {
            let mut state = self.lock_state();
            if matches!(state.phase, RunPhase::Connecting | RunPhase::Streaming) {
                return Err(StreamError::AlreadyActive);
            }
            state.phase = RunPhase::Rejoining;
            state.error = None;
        }
        self.notify();
        Ok(())
    }

    fn promote_to_streaming(&self) {
        let changed = {
            let mut state = self.lock_state();
            if matches!(state.phase, RunPhase::Connecting | RunPhase::Rejoining) {
                state.phase = RunPhase::Streaming;
                true
            } else {
                false
            }
        };
        if changed {
            self.notify();
        }
    }

    fn enter_idle_phase(&self) {
        self.mutate(|state| {
            state.phase = RunPhase::Idle;
        });
    }

    fn finish_naturally(&self) {
        self.mutate(|state| {
            state.phase = RunPhase::Idle;
            state.interrupt = extract_interrupt(&state.values);
        });
    }

    fn fail(&self, message: String) {
        self.mutate(|state| {
            state.phase = RunPhase::Error;
            state.error = Some(message);
        });
    }

    fn validate_ui(&self, snapshot: &Value) {
        if let Some(ui) = snapshot.get("ui") {
            let validated = self.ui_validator.validate(ui);
            if !validated.valid {
                tracing::warn!(thread_id = %self.thread_id, "ui payload failed schema validation; passing through");
            }
        }
    }

    /// Install a fresh cancellation token, superseding any previous one.
    fn replace_token(&self) -> CancellationSignal {
        let token: CancellationSignal = Arc::new(AtomicBool::new(false));
        *self.lock_cancel() = Some(Arc::clone(&token));
        token
    }

    fn mutate<F>(&self, mutation: F)
    where
        F: FnOnce(&mut RunState),
    {
        {
            let mut state = self.lock_state();
            mutation(&mut state);
        }
        self.notify();
    }

    fn notify(&self) {
        let snapshot = self.lock_state().clone();
        for (_, listener) in self.lock_listeners().iter() {
            listener(&snapshot);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        lock_unpoisoned(&self.state)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        lock_unpoisoned(&self.listeners)
    }

    fn lock_cancel(&self) -> MutexGuard<'_, Option<CancellationSignal>> {
        lock_unpoisoned(&self.cancel)
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("thread_id", &self.thread_id)
            .field("state", &self.lock_state())
            .finish()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> StreamManager {
        StreamManager::new("t1", Arc::new(ActiveRunRegistry::new()))
    }

    #[test]
    fn listeners_fire_per_mutation_and_unsubscribe() {
        let manager = manager();
        let seen = Arc::new(AtomicU64::new(0));
        let id = {
            let seen = Arc::clone(&seen);
            manager.subscribe(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };

        manager.apply_optimistic(|_| json!({"draft": true}));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        manager.unsubscribe(id);
        manager.apply_optimistic(|_| json!({"draft": false}));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn optimistic_mutation_marks_state_provisional() {
        let manager = manager();
        assert!(!manager.has_optimistic());

        manager.apply_optimistic(|values| {
            assert!(values.is_null());
            json!({"messages": ["draft"]})
        });

        assert!(manager.has_optimistic());
        assert_eq!(manager.snapshot().values, json!({"messages": ["draft"]}));
    }

    #[test]
    fn confirmed_values_supersede_optimistic_state() {
        let manager = manager();
        manager.apply_optimistic(|_| json!({"messages": ["draft"]}));

        manager.reduce(RunStreamEvent::Values {
            snapshot: json!({"messages": ["confirmed"]}),
        });

        assert!(!manager.has_optimistic());
        assert_eq!(manager.snapshot().values, json!({"messages": ["confirmed"]}));
    }

    #[test]
    fn stop_is_idempotent_and_safe_without_a_token() {
        let manager = manager();
        manager.stop();
        assert!(!manager.is_stopped());

        let token = manager.replace_token();
        manager.stop();
        manager.stop();
        assert!(token.load(Ordering::Acquire));
        assert!(manager.is_stopped());
    }

    #[test]
    fn overlapping_starts_are_rejected_rejoin_may_retry() {
        let manager = manager();
        manager.mutate(|state| state.phase = RunPhase::Streaming);
        assert!(matches!(
            manager.begin_start(),
            Err(StreamError::AlreadyActive)
        ));
        assert!(matches!(
            manager.begin_rejoin(),
            Err(StreamError::AlreadyActive)
        ));

        // A further rejoin attempt is allowed while already Rejoining.
        manager.mutate(|state| state.phase = RunPhase::Rejoining);
        assert!(manager.begin_rejoin().is_ok());
        assert!(matches!(
            manager.begin_start(),
            Err(StreamError::AlreadyActive)
        ));
    }

    #[test]
    fn metadata_event_registers_the_run() {
        let manager = manager();
        manager.reduce(RunStreamEvent::Metadata {
            run_id: Some("run-1".to_string()),
            raw: json!({"run_id": "run-1"}),
        });
        assert_eq!(
            manager.registry().get("t1").expect("registered").run_id,
            "run-1"
        );
    }

    #[test]
    fn custom_events_are_forwarded_not_retained() {
        let registry = Arc::new(ActiveRunRegistry::new());
        let forwarded = Arc::new(Mutex::new(Vec::new()));
        let manager = {
            let forwarded = Arc::clone(&forwarded);
            StreamManager::new("t1", registry).with_custom_handler(move |payload| {
                lock_unpoisoned(&forwarded).push(payload.clone());
            })
        };

        manager.reduce(RunStreamEvent::Custom {
            payload: json!({"widget": "chart"}),
        });

        assert_eq!(
            lock_unpoisoned(&forwarded).as_slice(),
            &[json!({"widget": "chart"})]
        );
        assert!(manager.snapshot().values.is_null());
    }

    #[test]
    fn end_event_preserves_a_pending_interrupt() {
        let manager = manager();
        manager.reduce(RunStreamEvent::Values {
            snapshot: json!({"__interrupt__": {"reason": "approval"}}),
        });
        manager.reduce(RunStreamEvent::End);

        let state = manager.snapshot();
        assert_eq!(state.phase, RunPhase::Idle);
        assert_eq!(state.interrupt, Some(json!({"reason": "approval"})));
    }

    #[test]
    fn end_event_clears_interrupt_when_final_snapshot_has_none() {
        let manager = manager();
        manager.reduce(RunStreamEvent::Values {
            snapshot: json!({"__interrupt__": {"reason": "approval"}}),
        });
        manager.reduce(RunStreamEvent::Values {
            snapshot: json!({"response": "done"}),
        });
        manager.reduce(RunStreamEvent::End);

        let state = manager.snapshot();
        assert_eq!(state.phase, RunPhase::Idle);
        assert_eq!(state.interrupt, None);
    }
}
