use serde_json::Value;

use crate::events::RunStreamEvent;

/// Incremental parser for the backend's SSE wire format.
///
/// Frames are blank-line delimited and carry an `event:` name line plus one
/// or more `data:` lines. Event kinds outside the consumed set are skipped;
/// a known kind with an unparseable payload becomes [`RunStreamEvent::Error`]
/// so the caller keeps failure policy.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RunStreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            let Some((name, payload)) = extract_frame(&frame) else {
                continue;
            };
            if let Some(event) = map_event(&name, &payload) {
                events.push(event);
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<RunStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn extract_frame(frame: &str) -> Option<(String, String)> {
    let mut name = "message".to_string();
    let mut data_lines = Vec::new();

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        }
    }

    if data_lines.is_empty() && name == "message" {
        return None;
    }
    Some((name, data_lines.join("\n")))
}

fn map_event(name: &str, payload: &str) -> Option<RunStreamEvent> {
    // Subgraph streams arrive namespaced as "values|<path>"; the snapshot
    // semantics are identical, so the namespace is dropped here.
    let kind = name.split('|').next().unwrap_or(name);

    match kind {
        "values" => Some(parse_payload(kind, payload, |snapshot| {
            RunStreamEvent::Values { snapshot }
        })),
        "custom" => Some(parse_payload(kind, payload, |payload| {
            RunStreamEvent::Custom { payload }
        })),
        "metadata" => Some(parse_payload(kind, payload, |raw| {
            let run_id = raw
                .get("run_id")
                .and_then(|value| value.as_str())
                .map(ToString::to_string);
            RunStreamEvent::Metadata { run_id, raw }
        })),
        "error" => Some(RunStreamEvent::Error {
            message: error_message(payload),
        }),
        "end" => Some(RunStreamEvent::End),
        _ => None,
    }
}

fn parse_payload<F>(kind: &str, payload: &str, build: F) -> RunStreamEvent
where
    F: FnOnce(Value) -> RunStreamEvent,
{
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => build(value),
        Err(error) => RunStreamEvent::Error {
            message: format!("malformed '{kind}' payload: {error}"),
        },
    }
}

fn error_message(payload: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(payload) {
        if let Some(message) = value.get("message").and_then(|value| value.as_str()) {
            return message.to_string();
        }
        if let Some(message) = value.as_str() {
            return message.to_string();
        }
    }

    if payload.trim().is_empty() {
        "stream reported an unspecified error".to_string()
    } else {
        payload.trim().to_string()
    }
}
