use serde::Deserialize;
use serde_json::Value;

/// Key under which the backend declares mid-run stages inside `values`.
pub const DYNAMIC_STAGES_KEY: &str = "__stages__";

/// One row of the progress indicator shown while a run is thinking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThoughtStage {
    /// Stable identifier; also names the `values` field whose presence
    /// marks the stage as underway (see [`stage_field`]).
    pub id: String,
    pub label: String,
    pub detail: Option<String>,
}

impl ThoughtStage {
    fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}

/// Backend-declared stage definition carried inside `values.__stages__`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DynamicStageDef {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Parse the dynamic stage declarations out of a snapshot. Malformed
/// entries are dropped individually; a missing or non-array key yields an
/// empty list.
pub fn dynamic_stage_defs(values: &Value) -> Vec<DynamicStageDef> {
    values
        .get(DYNAMIC_STAGES_KEY)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Derive the full stage skeleton.
///
/// The pre and post stages are fixed; the middle comes from the backend's
/// declared stages when present, otherwise a single generic processing
/// stage detailed with the flow type. With no declarations the result is
/// always exactly four stages.
pub fn derive_stages(flow_type: Option<&str>, dynamic: &[DynamicStageDef]) -> Vec<ThoughtStage> {
    let mut stages = vec![
        ThoughtStage::new("resolve", "Resolving entities"),
        ThoughtStage::new("intent", "Classifying intent"),
    ];

    if dynamic.is_empty() {
        stages.push(
            ThoughtStage::new("processing", "Processing")
                .with_detail(flow_type.map(str::to_string)),
        );
    } else {
        for def in dynamic {
            stages.push(ThoughtStage {
                id: def.id.clone(),
                label: def.label.clone(),
                detail: def.detail.clone(),
            });
        }
    }

    stages.push(ThoughtStage::new("respond", "Composing response"));
    stages
}

/// [`derive_stages`] driven directly from a snapshot: flow type from
/// `values.flow_type`, declarations from `values.__stages__`.
pub fn derive_stages_from_flow(values: &Value) -> Vec<ThoughtStage> {
    let flow_type = values.get("flow_type").and_then(Value::as_str);
    derive_stages(flow_type, &dynamic_stage_defs(values))
}

/// `values` field whose presence marks the given stage as underway.
pub fn stage_field(stage_id: &str) -> &str {
    match stage_id {
        "resolve" => "entities",
        "intent" => "intent",
        "respond" => "response",
        other => other,
    }
}

/// How many stages to reveal for a snapshot. Data-driven only: reveal
/// count never advances on wall-clock time, and a stage never reads as
/// done before the data proving it exists.
///
/// A populated field for stage `i` reveals stage `i + 1` (the prior stage
/// finished producing its data, so the next is underway); a field
/// populated for a later stage implies every earlier stage completed.
/// With nothing populated, only the first stage shows.
pub fn compute_data_driven_reveal(values: &Value, stages: &[ThoughtStage]) -> usize {
    if stages.is_empty() {
        return 0;
    }

    let mut reveal = 1;
    for (position, stage) in stages.iter().enumerate() {
        let populated = values
            .get(stage_field(&stage.id))
            .is_some_and(|field| !field.is_null());
        if populated {
            reveal = reveal.max((position + 2).min(stages.len()));
        }
    }
    reveal
}
