mod common;

use std::sync::Arc;

use common::FakeClient;
use serde_json::json;
use thread_sync::{
    ActiveRunRegistry, EventStream, GraphApiError, RunPhase, RunStreamEvent, StreamManager,
    StreamOutcome, ThreadSession,
};

#[tokio::test]
async fn stop_mid_stream_settles_idle_and_keeps_run_registered() {
    let registry = Arc::new(ActiveRunRegistry::new());
    let manager = Arc::new(StreamManager::new("t1", Arc::clone(&registry)));

    // Stop from a listener as soon as the stream is live; the remaining
    // buffered event is still drained, then the sequence ends.
    {
        let stopper = Arc::clone(&manager);
        manager.subscribe(move |state| {
            if state.phase == RunPhase::Streaming {
                stopper.stop();
            }
        });
    }

    let outcome = manager
        .start(|_| async {
            Ok(EventStream::from_events(vec![
                RunStreamEvent::Metadata {
                    run_id: Some("run-1".to_string()),
                    raw: json!({"run_id": "run-1"}),
                },
                RunStreamEvent::Values {
                    snapshot: json!({"intent": "billing"}),
                },
            ]))
        })
        .await
        .expect("cancel is not an error");

    assert_eq!(outcome, StreamOutcome::Cancelled);
    let state = manager.snapshot();
    assert_eq!(state.phase, RunPhase::Idle);
    assert!(state.error.is_none());
    assert_eq!(state.values, json!({"intent": "billing"}));
    // The backend run continues unattended and must stay resumable.
    assert_eq!(registry.get("t1").expect("still registered").run_id, "run-1");
}

#[tokio::test]
async fn stop_during_connect_reports_cancelled_not_error() {
    let manager = StreamManager::new("t1", Arc::new(ActiveRunRegistry::new()));

    let outcome = manager
        .start(|cancel| async move {
            cancel.store(true, std::sync::atomic::Ordering::Release);
            Err(GraphApiError::Cancelled)
        })
        .await
        .expect("cancel is not an error");

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(manager.snapshot().phase, RunPhase::Idle);
}

#[tokio::test]
async fn switching_threads_fires_only_the_previous_token() {
    let client = FakeClient::new();
    let mut session = ThreadSession::new(client);

    session.open_thread("t1").await.expect("opens t1");
    let first = Arc::clone(session.manager().expect("t1 manager"));
    // Give the first thread a live token to observe.
    first
        .start(|_| async { Ok(EventStream::from_events(vec![RunStreamEvent::End])) })
        .await
        .expect("stream completes");
    assert!(!first.is_stopped());

    session.open_thread("t2").await.expect("opens t2");
    let second = session.manager().expect("t2 manager");

    assert!(first.is_stopped());
    assert!(!second.is_stopped());
    assert_eq!(second.thread_id(), "t2");
}

#[tokio::test]
async fn reopening_the_open_thread_is_a_no_op() {
    let client = FakeClient::new();
    let mut session = ThreadSession::new(client);

    session.open_thread("t1").await.expect("opens");
    let first = Arc::clone(session.manager().expect("manager installed"));

    let outcome = session.open_thread("t1").await.expect("no-op");
    assert!(outcome.is_none());
    assert!(Arc::ptr_eq(&first, session.manager().expect("same manager")));
    // No token fired, no second hydration.
    assert!(!first.is_stopped());
    assert_eq!(session.client().calls("get_state"), 1);
}

#[tokio::test]
async fn session_stop_is_safe_and_idempotent() {
    let client = FakeClient::new();
    let mut session = ThreadSession::new(client);

    // No thread open yet.
    session.stop();

    session.open_thread("t1").await.expect("opens");
    session.stop();
    session.stop();
    assert_eq!(
        session.manager().expect("manager installed").snapshot().phase,
        RunPhase::Idle
    );
}
