use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use time::OffsetDateTime;

/// One in-flight run known to survive navigation away from its thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRun {
    pub thread_id: String,
    pub run_id: String,
    pub registered_at: OffsetDateTime,
}

/// Process-wide map from thread id to its in-flight run.
///
/// Injected as a service object rather than ambient global state so tests
/// get an isolated instance each. Set/get/delete are individually atomic;
/// multiple stream managers share one registry over the app's lifetime.
///
/// An entry is removed only when the run is confirmed terminal; a
/// client-initiated stop leaves it in place because the backend run
/// continues unattended.
#[derive(Debug, Default)]
pub struct ActiveRunRegistry {
    runs: Mutex<HashMap<String, ActiveRun>>,
}

impl ActiveRunRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `run_id` as the active run for `thread_id`, replacing any
    /// previous entry for that thread.
    pub fn register(&self, thread_id: &str, run_id: &str) {
        tracing::debug!(thread_id, run_id, "registering active run");
        self.lock_runs().insert(
            thread_id.to_string(),
            ActiveRun {
                thread_id: thread_id.to_string(),
                run_id: run_id.to_string(),
                registered_at: OffsetDateTime::now_utc(),
            },
        );
    }

    pub fn get(&self, thread_id: &str) -> Option<ActiveRun> {
        self.lock_runs().get(thread_id).cloned()
    }

    /// Remove the entry for `thread_id`, returning it if present.
    pub fn unregister(&self, thread_id: &str) -> Option<ActiveRun> {
        let removed = self.lock_runs().remove(thread_id);
        if let Some(run) = &removed {
            tracing::debug!(thread_id, run_id = %run.run_id, "unregistered active run");
        }
        removed
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.lock_runs().contains_key(thread_id)
    }

    pub fn len(&self) -> usize {
        self.lock_runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_runs().is_empty()
    }

    fn lock_runs(&self) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
        match self.runs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
