use serde_json::Value;

/// Well-known control key the backend uses to signal a pause awaiting
/// external input.
pub const INTERRUPT_KEY: &str = "__interrupt__";

/// Lifecycle phase of the run owned by one [`StreamManager`](crate::StreamManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Connecting,
    Streaming,
    Rejoining,
    Error,
}

impl RunPhase {
    /// Phases during which a stream connection is owned by the manager.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming | Self::Rejoining)
    }
}

/// Authoritative run state snapshot exposed to subscribers.
///
/// `values` is replaced wholesale by each confirmed `values` event
/// (last-write-wins); it is never deep-merged. An optimistic local
/// mutation survives only until the first confirmed event arrives.
#[derive(Debug, Clone)]
pub struct RunState {
    pub phase: RunPhase,
    pub values: Value,
    /// Last fatal error; cleared by the next successful event.
    pub error: Option<String>,
    /// Control value extracted from `values.__interrupt__`, present while
    /// the run is paused for external input.
    pub interrupt: Option<Value>,
}

impl RunState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            values: Value::Null,
            error: None,
            interrupt: None,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the interrupt marker from a snapshot, if any.
pub fn extract_interrupt(values: &Value) -> Option<Value> {
    values
        .get(INTERRUPT_KEY)
        .filter(|marker| !marker.is_null())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interrupt_marker_is_extracted_when_present() {
        let values = json!({"intent": "x", INTERRUPT_KEY: {"reason": "approval"}});
        assert_eq!(extract_interrupt(&values), Some(json!({"reason": "approval"})));
    }

    #[test]
    fn null_or_missing_marker_yields_none() {
        assert_eq!(extract_interrupt(&json!({"intent": "x"})), None);
        assert_eq!(extract_interrupt(&json!({INTERRUPT_KEY: null})), None);
        assert_eq!(extract_interrupt(&Value::Null), None);
    }

    #[test]
    fn active_phases_are_classified() {
        assert!(RunPhase::Connecting.is_active());
        assert!(RunPhase::Streaming.is_active());
        assert!(RunPhase::Rejoining.is_active());
        assert!(!RunPhase::Idle.is_active());
        assert!(!RunPhase::Error.is_active());
    }
}
