use std::sync::Arc;

use branch_index::BranchIndex;
use graph_api::RunSubmission;
use serde_json::Value;

use crate::manager::{StreamError, StreamManager, StreamOutcome};
use crate::registry::ActiveRunRegistry;
use crate::rejoin::{finish_run, resume_active_run, ResumeOutcome};
use crate::thread_client::ThreadClient;
use crate::ui_schema::UiSchemaValidator;

/// Conversation-level coordinator: one open thread at a time, one
/// [`StreamManager`] per open thread, shared run registry and branch index
/// across thread switches.
///
/// Switching threads fires the previous thread's cancellation token; the
/// abandoned run stays registered and is resumed on the next visit.
pub struct ThreadSession<C> {
    client: C,
    registry: Arc<ActiveRunRegistry>,
    branch: Arc<BranchIndex>,
    manager: Option<Arc<StreamManager>>,
    thread_id: Option<String>,
    custom_handler: Option<Arc<dyn Fn(&Value) + Send + Sync>>,
    ui_validator: Option<Arc<dyn UiSchemaValidator>>,
}

impl<C> ThreadSession<C>
where
    C: ThreadClient,
{
    pub fn new(client: C) -> Self {
        Self {
            client,
            registry: Arc::new(ActiveRunRegistry::new()),
            branch: Arc::new(BranchIndex::new()),
            manager: None,
            thread_id: None,
            custom_handler: None,
            ui_validator: None,
        }
    }

    /// Share a registry across sessions, typically the app-wide one that
    /// outlives individual thread visits.
    pub fn with_registry(mut self, registry: Arc<ActiveRunRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_custom_handler(
        mut self,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Self {
        self.custom_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_ui_validator(mut self, validator: Arc<dyn UiSchemaValidator>) -> Self {
        self.ui_validator = Some(validator);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn registry(&self) -> &Arc<ActiveRunRegistry> {
        &self.registry
    }

    pub fn branch_index(&self) -> &Arc<BranchIndex> {
        &self.branch
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// State machine for the currently open thread, if any.
    pub fn manager(&self) -> Option<&Arc<StreamManager>> {
        self.manager.as_ref()
    }

    /// Open `thread_id`: hydrate state and history over REST, then resume
    /// its registered run if one is pending.
    ///
    /// Re-opening the already-open thread is a no-op that keeps the live
    /// stream and its cancellation token intact. Opening a different
    /// thread stops the previous thread's stream first.
    pub async fn open_thread(
        &mut self,
        thread_id: &str,
    ) -> Result<Option<ResumeOutcome>, StreamError> {
        if self.thread_id.as_deref() == Some(thread_id) {
            return Ok(None);
        }

        let manager = self.install_thread(thread_id);
        self.hydrate(thread_id).await;

        if let Some(pending) = self.registry.get(thread_id) {
            let outcome = resume_active_run(
                &manager,
                &self.client,
                &self.branch,
                thread_id,
                &pending.run_id,
            )
            .await?;
            return Ok(Some(outcome));
        }
        Ok(None)
    }

    /// Submit a new run on the open thread, creating a thread first if
    /// none is open. `optimistic` mutates `values` synchronously before
    /// the stream opens; pass the identity to skip it.
    ///
    /// On natural completion the run is unregistered and the branch index
    /// refreshed. A stop or transport failure leaves the run registered so
    /// the next visit can rejoin it.
    pub async fn submit<F>(
        &mut self,
        submission: RunSubmission,
        optimistic: F,
    ) -> Result<StreamOutcome, StreamError>
    where
        F: FnOnce(Value) -> Value,
    {
        let (thread_id, manager) = match self.thread_id.clone() {
            Some(id) => {
                let manager = match &self.manager {
                    Some(manager) => Arc::clone(manager),
                    None => self.install_thread(&id),
                };
                (id, manager)
            }
            None => {
                let info = self.client.create_thread().await?;
                let manager = self.install_thread(&info.thread_id);
                (info.thread_id, manager)
            }
        };

        manager.apply_optimistic(optimistic);

        let client = &self.client;
        let result = manager
            .start(|cancel| client.open_run_stream(&thread_id, submission, Some(cancel)))
            .await;

        match &result {
            Ok(StreamOutcome::Completed) => {
                finish_run(&manager, client, &self.branch, &thread_id, false).await;
            }
            Ok(StreamOutcome::Cancelled) | Err(StreamError::Transport(_)) => {
                // The backend run may still be executing; keep it
                // registered for rejoin.
            }
            Err(StreamError::Backend(_)) => {
                self.registry.unregister(&thread_id);
            }
            Err(StreamError::AlreadyActive) => {}
        }
        result
    }

    /// Stop the open thread's in-flight stream, if any. The backend run
    /// keeps executing and stays registered.
    pub fn stop(&self) {
        if let Some(manager) = &self.manager {
            manager.stop();
        }
    }

    fn install_thread(&mut self, thread_id: &str) -> Arc<StreamManager> {
        if let Some(previous) = &self.manager {
            previous.stop();
        }
        self.branch.clear();

        let mut manager = StreamManager::new(thread_id, Arc::clone(&self.registry));
        if let Some(handler) = &self.custom_handler {
            let handler = Arc::clone(handler);
            manager = manager.with_custom_handler(move |payload| handler(payload));
        }
        if let Some(validator) = &self.ui_validator {
            manager = manager.with_ui_validator(Arc::clone(validator));
        }

        let manager = Arc::new(manager);
        self.manager = Some(Arc::clone(&manager));
        self.thread_id = Some(thread_id.to_string());
        manager
    }

    /// Best-effort REST hydration; a cold cache is not fatal.
    async fn hydrate(&self, thread_id: &str) {
        match self.client.get_state(thread_id).await {
            Ok(values) => {
                if let Some(manager) = &self.manager {
                    manager.refresh_from_snapshot(values);
                }
            }
            Err(error) => {
                tracing::warn!(thread_id, %error, "state hydration failed");
            }
        }
        match self.client.get_history(thread_id).await {
            Ok(history) => self.branch.update(&history),
            Err(error) => {
                tracing::warn!(thread_id, %error, "history hydration failed");
            }
        }
    }
}

impl<C> std::fmt::Debug for ThreadSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSession")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}
