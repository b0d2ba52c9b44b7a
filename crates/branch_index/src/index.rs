use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use graph_api::CheckpointRecord;

/// Branch metadata for one occurrence of a message in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBranch {
    /// Checkpoint the message occurrence belongs to.
    pub branch_id: String,
    /// Parent checkpoint, absent for history roots.
    pub parent_branch_id: Option<String>,
    /// All checkpoints sharing the same parent, in traversal order.
    /// Includes `branch_id` itself.
    pub sibling_branch_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct IndexSnapshot {
    /// Occurrences per message id, in history traversal order.
    by_message: HashMap<String, Vec<MessageBranch>>,
    checkpoint_count: usize,
}

/// Atomic-swap index from message identity to branch metadata.
#[derive(Debug, Default)]
pub struct BranchIndex {
    snapshot: Mutex<Arc<IndexSnapshot>>,
}

impl BranchIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from checkpoint history, replacing it atomically.
    pub fn update(&self, history: &[CheckpointRecord]) {
        let built = Arc::new(build_snapshot(history));
        *self.lock_snapshot() = built;
    }

    /// Reset to empty, for thread switches.
    pub fn clear(&self) {
        *self.lock_snapshot() = Arc::new(IndexSnapshot::default());
    }

    /// Branch metadata for a message by plain identity. When the id appears
    /// in several checkpoints, the later checkpoint in traversal order wins.
    /// `None` means the message is not yet indexed (not yet persisted).
    pub fn get(&self, message_id: &str) -> Option<MessageBranch> {
        let snapshot = self.current();
        snapshot
            .by_message
            .get(message_id)
            .and_then(|occurrences| occurrences.last())
            .cloned()
    }

    /// Branch metadata for a specific occurrence of a message id, counted
    /// in traversal order. Callers pass this when plain identity is
    /// ambiguous after an edit.
    pub fn get_at(&self, message_id: &str, occurrence_index: usize) -> Option<MessageBranch> {
        let snapshot = self.current();
        snapshot
            .by_message
            .get(message_id)
            .and_then(|occurrences| occurrences.get(occurrence_index))
            .cloned()
    }

    /// Number of occurrences indexed for a message id.
    pub fn occurrence_count(&self, message_id: &str) -> usize {
        self.current()
            .by_message
            .get(message_id)
            .map_or(0, Vec::len)
    }

    pub fn checkpoint_count(&self) -> usize {
        self.current().checkpoint_count
    }

    pub fn is_empty(&self) -> bool {
        self.current().checkpoint_count == 0
    }

    fn current(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.lock_snapshot())
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Arc<IndexSnapshot>> {
        match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn build_snapshot(history: &[CheckpointRecord]) -> IndexSnapshot {
    // Siblings first: checkpoints grouped by parent, in traversal order.
    let mut siblings_by_parent: HashMap<Option<&str>, Vec<String>> = HashMap::new();
    for record in history {
        siblings_by_parent
            .entry(record.parent_checkpoint_id.as_deref())
            .or_default()
            .push(record.checkpoint_id.clone());
    }

    let mut by_message: HashMap<String, Vec<MessageBranch>> = HashMap::new();
    for record in history {
        let siblings = siblings_by_parent
            .get(&record.parent_checkpoint_id.as_deref())
            .cloned()
            .unwrap_or_default();
        for message in &record.messages {
            by_message
                .entry(message.id.clone())
                .or_default()
                .push(MessageBranch {
                    branch_id: record.checkpoint_id.clone(),
                    parent_branch_id: record.parent_checkpoint_id.clone(),
                    sibling_branch_ids: siblings.clone(),
                });
        }
    }

    IndexSnapshot {
        by_message,
        checkpoint_count: history.len(),
    }
}
