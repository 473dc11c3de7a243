//! Normalization of model server payloads
//!
//! The generate endpoint may answer with a JSON object, a bare JSON string,
//! or text that is not JSON at all. Both reply modes funnel through the
//! functions here so callers only ever see [`GenerationOutput`] and plain
//! text fragments.

use crate::types::GenerationOutput;
use serde_json::Value;

/// One decoded line of a streaming reply
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFragment {
    pub text: String,
    /// Completion flag reported by the server on this line
    pub done: bool,
    pub model: Option<String>,
}

/// Normalize a complete non-streaming body.
pub fn normalize_body(body: &str, requested_model: &str) -> GenerationOutput {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => GenerationOutput {
            text: map.get("response").map(value_text).unwrap_or_default(),
            model: map
                .get("model")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or(requested_model)
                .to_string(),
            created_at: map
                .get("created_at")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            done: map.get("done").and_then(Value::as_bool).unwrap_or(true),
        },
        Ok(other) => GenerationOutput::text_only(value_text(&other), requested_model),
        Err(_) => GenerationOutput::text_only(body.to_string(), requested_model),
    }
}

/// Decode one line of a streaming reply.
///
/// Returns `None` for blank lines. Lines that are not JSON are passed
/// through as text.
pub fn parse_stream_line(line: &[u8]) -> Option<StreamFragment> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    let fragment = match serde_json::from_slice::<Value>(line) {
        Ok(Value::Object(map)) => StreamFragment {
            text: map.get("response").map(value_text).unwrap_or_default(),
            done: map.get("done").and_then(Value::as_bool).unwrap_or(false),
            model: map
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        Ok(other) => StreamFragment {
            text: value_text(&other),
            done: false,
            model: None,
        },
        Err(_) => StreamFragment {
            text: String::from_utf8_lossy(line).into_owned(),
            done: false,
            model: None,
        },
    };

    Some(fragment)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Reassembles newline-delimited lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, without the newline.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            lines.push(line);
        }
        lines
    }

    /// Take whatever remains after the transport closed.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_body_keeps_server_fields() {
        let body = r#"{"model":"phi:latest","created_at":"2024-05-01T10:00:00Z","response":"Hello","done":true}"#;
        let output = normalize_body(body, "phi");
        assert_eq!(output.text, "Hello");
        assert_eq!(output.model, "phi:latest");
        assert_eq!(output.created_at.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert!(output.done);
    }

    #[test]
    fn bare_string_and_plain_text_bodies() {
        let quoted = normalize_body(r#""just text""#, "researcher");
        assert_eq!(quoted.text, "just text");
        assert_eq!(quoted.model, "researcher");
        assert!(quoted.created_at.is_none());

        let raw = normalize_body("not { json", "researcher");
        assert_eq!(raw.text, "not { json");
        assert!(raw.done);
    }

    #[test]
    fn object_without_response_yields_empty_text() {
        let output = normalize_body(r#"{"model":"","done":false}"#, "researcher");
        assert_eq!(output.text, "");
        assert_eq!(output.model, "researcher");
        assert!(!output.done);
    }

    #[test]
    fn stream_lines_tolerate_garbage() {
        assert_eq!(parse_stream_line(b"   "), None);
        assert_eq!(parse_stream_line(b"\r"), None);

        let json = parse_stream_line(br#"{"response":"Hel","done":false}"#).unwrap();
        assert_eq!(json.text, "Hel");
        assert!(!json.done);

        let text = parse_stream_line(b"data: partial\r").unwrap();
        assert_eq!(text.text, "data: partial");

        let number = parse_stream_line(b"42").unwrap();
        assert_eq!(number.text, "42");
    }

    #[test]
    fn line_buffer_handles_split_chunks() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(br#"{"response":"a"#).is_empty());
        let lines = buffer.push(b"\"}\n{\"response\":\"b\"}\n{\"resp");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], br#"{"response":"a"}"#.to_vec());
        assert_eq!(buffer.finish(), Some(br#"{"resp"#.to_vec()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_multibyte_characters_intact() {
        let text = "{\"response\":\"caf\u{e9}\"}\n".as_bytes();
        let (head, tail) = text.split_at(text.len() - 4);
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(head).is_empty());
        let lines = buffer.push(tail);
        let fragment = parse_stream_line(&lines[0]).unwrap();
        assert_eq!(fragment.text, "caf\u{e9}");
    }
}
