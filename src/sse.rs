//! SSE (Server-Sent Events) framing for delta events.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

use crate::emitter::Event;

/// Payload of the terminal event.
pub const DONE_MARKER: &str = "[DONE]";

/// Format a text fragment as a delta event.
pub fn format_sse_delta(fragment: &str) -> Bytes {
    let data = json!({ "choices": [{ "delta": { "content": fragment } }] });
    format!("data: {}\n\n", data).into()
}

/// Format the done marker as an SSE event.
pub fn format_sse_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Delta envelope as seen by a client decoding the stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeltaEnvelope {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Choice {
    pub delta: Delta,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: String,
}

/// Decode one SSE frame (with or without its blank-line terminator).
///
/// Returns `None` for frames that are not `data:` lines or whose JSON does
/// not carry a delta.
pub fn parse_sse_event(frame: &str) -> Option<Event> {
    let data = frame.trim_end_matches('\n').strip_prefix("data: ")?;
    if data == DONE_MARKER {
        return Some(Event::Done);
    }
    let envelope: DeltaEnvelope = serde_json::from_str(data).ok()?;
    let choice = envelope.choices.into_iter().next()?;
    Some(Event::Delta(choice.delta.content))
}

/// Split a complete SSE body into decoded events, in order.
pub fn parse_sse_body(body: &str) -> Vec<Event> {
    body.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .filter_map(parse_sse_event)
        .collect()
}
