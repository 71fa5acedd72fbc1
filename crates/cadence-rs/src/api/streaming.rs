//! Server-Sent Events (SSE) frame parsing for agent endpoint responses.
//!
//! Agent endpoints deliver responses as newline-delimited frames prefixed
//! `data: `, each payload a JSON object exposing `choices[0].delta.content`.
//! The literal payload `[DONE]` terminates the stream.

use serde::Deserialize;
use tracing::warn;

/// A single event from an SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental text content delta.
    TextDelta(String),
    /// The stream is complete.
    Done,
}

/// Prefix marking a data frame.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the stream early.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Raw SSE data payload.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Parse one raw line from the streamed body.
///
/// Returns `None` for blank lines, comment lines, non-data lines, empty
/// deltas, and malformed payloads — a malformed frame is a recoverable
/// per-frame condition, not a stream failure.
pub fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix(DATA_PREFIX)?;
    if data == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .and_then(|choices| choices.into_iter().next())
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)?;
            if content.is_empty() {
                None
            } else {
                Some(StreamEvent::TextDelta(content))
            }
        }
        Err(e) => {
            warn!("Skipping malformed stream frame: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(StreamEvent::TextDelta("Hello".into()))
        );
    }

    #[test]
    fn parses_done_sentinel() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(StreamEvent::Done));
        assert_eq!(parse_sse_line("data: [DONE]\n"), Some(StreamEvent::Done));
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line("   "), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
    }

    #[test]
    fn ignores_non_data_lines() {
        assert_eq!(parse_sse_line("event: message"), None);
    }

    #[test]
    fn skips_malformed_payload() {
        assert_eq!(parse_sse_line("data: {not json"), None);
    }

    #[test]
    fn skips_missing_or_empty_content() {
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#),
            None
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            None
        );
    }
}
