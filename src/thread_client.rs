use graph_api::{
    CancellationSignal, CheckpointRecord, EventStream, GraphApiClient, GraphApiError, RunStatus,
    RunSubmission, ThreadInfo,
};
use serde_json::Value;

/// Backend operations the session and rejoin layers depend on.
///
/// [`GraphApiClient`] is the production implementation; tests substitute
/// scripted fakes to exercise lifecycle policy without a network.
#[allow(async_fn_in_trait)]
pub trait ThreadClient: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadInfo, GraphApiError>;

    async fn get_state(&self, thread_id: &str) -> Result<Value, GraphApiError>;

    async fn get_history(&self, thread_id: &str) -> Result<Vec<CheckpointRecord>, GraphApiError>;

    async fn get_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunStatus, GraphApiError>;

    async fn open_run_stream(
        &self,
        thread_id: &str,
        submission: RunSubmission,
        cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, GraphApiError>;

    async fn open_rejoin_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, GraphApiError>;
}

impl ThreadClient for GraphApiClient {
    async fn create_thread(&self) -> Result<ThreadInfo, GraphApiError> {
        GraphApiClient::create_thread(self).await
    }

    async fn get_state(&self, thread_id: &str) -> Result<Value, GraphApiError> {
        GraphApiClient::get_state(self, thread_id).await
    }

    async fn get_history(&self, thread_id: &str) -> Result<Vec<CheckpointRecord>, GraphApiError> {
        GraphApiClient::get_history(self, thread_id).await
    }

    async fn get_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunStatus, GraphApiError> {
        GraphApiClient::get_run_status(self, thread_id, run_id).await
    }

    async fn open_run_stream(
        &self,
        thread_id: &str,
        submission: RunSubmission,
        cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, GraphApiError> {
        GraphApiClient::open_run_stream(self, thread_id, submission, cancellation).await
    }

    async fn open_rejoin_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, GraphApiError> {
        GraphApiClient::open_rejoin_stream(self, thread_id, run_id, cancellation).await
    }
}
