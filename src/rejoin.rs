use std::time::Duration;

use branch_index::BranchIndex;

use crate::manager::{StreamError, StreamManager, StreamOutcome};
use crate::thread_client::ThreadClient;

/// Ambiguous zero-event rejoins are re-tried this many times before the
/// policy gives up and leaves the run registered for a later visit.
pub const REJOIN_MAX_ATTEMPTS: u32 = 3;
/// Fixed pause between ambiguous attempts. No backoff: the question is
/// "has the run finished yet", not "is the backend overloaded".
pub const REJOIN_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What became of a previously-registered run after a resume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The stream delivered events and ran to completion in our sight.
    Resumed,
    /// The run reached a terminal status while disconnected; state and
    /// history were refreshed from REST.
    FinishedWhileAway,
    /// Every attempt came back empty and the status endpoint never
    /// confirmed a terminal state. The run stays registered and the phase
    /// stays `Rejoining`.
    StillRunning,
    /// A stop arrived while resuming.
    Cancelled,
}

/// Re-attach to the registered run for `thread_id`.
///
/// A rejoin connection that yields zero events is ambiguous: the run may
/// have finished while we were away, or the resume endpoint may simply
/// have nothing buffered yet. Each such connection is followed by a
/// run-status check; only a confirmed terminal status unregisters the run
/// and refreshes state, and only a streamed or confirmed outcome ends the
/// loop early.
pub async fn resume_active_run<C>(
    manager: &StreamManager,
    client: &C,
    branch: &BranchIndex,
    thread_id: &str,
    run_id: &str,
) -> Result<ResumeOutcome, StreamError>
where
    C: ThreadClient,
{
    for attempt in 1..=REJOIN_MAX_ATTEMPTS {
        let report = match manager
            .rejoin(|cancel| client.open_rejoin_stream(thread_id, run_id, Some(cancel)))
            .await
        {
            Ok(report) => report,
            Err(StreamError::Backend(message)) => {
                // A terminal error event confirms the run is over; the
                // entry must not survive to resurrect a dead run.
                manager.registry().unregister(thread_id);
                return Err(StreamError::Backend(message));
            }
            Err(error) => return Err(error),
        };

        if report.outcome == StreamOutcome::Cancelled {
            return Ok(ResumeOutcome::Cancelled);
        }

        if report.events > 0 {
            finish_run(manager, client, branch, thread_id, false).await;
            return Ok(ResumeOutcome::Resumed);
        }

        match client.get_run_status(thread_id, run_id).await {
            Ok(status) if status.is_terminal() => {
                tracing::info!(thread_id, run_id, status = status.as_str(), "run finished while disconnected");
                finish_run(manager, client, branch, thread_id, true).await;
                return Ok(ResumeOutcome::FinishedWhileAway);
            }
            Ok(status) => {
                tracing::debug!(thread_id, run_id, status = status.as_str(), attempt, "run not terminal after empty rejoin");
            }
            Err(error) => {
                // A failed status probe counts against the attempt budget
                // like any other ambiguous outcome.
                tracing::warn!(thread_id, run_id, %error, attempt, "run status check failed after empty rejoin");
            }
        }

        if attempt < REJOIN_MAX_ATTEMPTS {
            tokio::time::sleep(REJOIN_RETRY_DELAY).await;
            if manager.settle_if_stopped() {
                return Ok(ResumeOutcome::Cancelled);
            }
        }
    }

    tracing::warn!(
        thread_id,
        run_id,
        attempts = REJOIN_MAX_ATTEMPTS,
        "giving up on rejoin; run stays registered"
    );
    Ok(ResumeOutcome::StillRunning)
}

/// Post-completion bookkeeping: unregister first so a crash mid-refresh
/// never resurrects a finished run, then refresh state (REST path only)
/// and the branch index best-effort.
pub(crate) async fn finish_run<C>(
    manager: &StreamManager,
    client: &C,
    branch: &BranchIndex,
    thread_id: &str,
    refresh_state: bool,
) where
    C: ThreadClient,
{
    manager.registry().unregister(thread_id);

    if refresh_state {
        match client.get_state(thread_id).await {
            Ok(values) => manager.refresh_from_snapshot(values),
            Err(error) => {
                tracing::warn!(thread_id, %error, "state refresh failed after terminal run");
                manager.settle_idle();
            }
        }
    }

    match client.get_history(thread_id).await {
        Ok(history) => branch.update(&history),
        Err(error) => {
            tracing::warn!(thread_id, %error, "history refresh failed after terminal run");
        }
    }
}
