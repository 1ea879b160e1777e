//! Line framing and frame decoding for the answer event stream.

use tracing::debug;

use crate::errors::render_error_value;

const FRAME_PREFIX: &str = "data: ";
const GENERIC_STREAM_ERROR: &str = "stream error";

/// Event carried by one `data:` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrameEvent {
    Token(String),
    Done,
    Error(String),
}

/// Accumulates raw transport bytes and yields complete lines.
///
/// Lines are split on `\n` at the byte level, so a multi-byte UTF-8
/// character cut by a chunk boundary is reassembled before decoding.
#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Appends `chunk` and returns every line it completed, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        // Bytes already buffered hold no newline.
        let mut scan = self.buf.len();
        self.buf.extend_from_slice(chunk);
        let mut start = 0;
        let mut lines = Vec::new();
        while let Some(pos) = self.buf[scan..].iter().position(|b| *b == b'\n') {
            let end = scan + pos;
            lines.push(decode_line(&self.buf[start..end]));
            start = end + 1;
            scan = start;
        }
        self.buf.drain(..start);
        lines
    }

    /// Returns the unterminated tail left when the transport ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.buf);
        Some(decode_line(&tail))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(text.as_ref()).to_string()
}

#[derive(Debug, serde::Deserialize)]
struct WireFrame {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Parses one line into the events it carries, in processing order.
///
/// Returns `None` for lines that are not frames (blank lines, comments,
/// keep-alives) and for frames whose payload is not a JSON object of the
/// expected shape. A frame may carry a final token together with `done` or
/// `error`; the token is listed first. Error values that are not readable
/// text become a generic message rather than raw JSON.
pub(crate) fn parse_frame(line: &str) -> Option<Vec<FrameEvent>> {
    let payload = line.strip_prefix(FRAME_PREFIX)?;
    let frame: WireFrame = match serde_json::from_str(payload) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "discarding undecodable stream frame");
            return None;
        }
    };

    let mut events = Vec::with_capacity(2);
    if let Some(token) = frame.token.filter(|t| !t.is_empty()) {
        events.push(FrameEvent::Token(token));
    }
    match frame.error.filter(error_is_set) {
        None => {
            if frame.done == Some(true) {
                events.push(FrameEvent::Done);
            }
        }
        Some(value) => {
            let message =
                render_error_value(&value).unwrap_or_else(|| GENERIC_STREAM_ERROR.to_string());
            events.push(FrameEvent::Error(message));
        }
    }
    Some(events)
}

/// `null`, `false`, `0` and `""` mean "no error"; any other value ends the stream.
fn error_is_set(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(set) => *set,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_retains_partial_line_across_chunks() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"tok").is_empty());
        assert!(decoder.push_chunk(b"en\":\"Hel").is_empty());
        let lines = decoder.push_chunk(b"lo\"}\ndata: {\"done\"");
        assert_eq!(lines, vec!["data: {\"token\":\"Hello\"}".to_string()]);
        let lines = decoder.push_chunk(b":true}\n");
        assert_eq!(lines, vec!["data: {\"done\":true}".to_string()]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decoder_emits_blank_separator_lines_and_strips_cr() {
        let mut decoder = LineDecoder::default();
        let lines = decoder.push_chunk(b"data: {\"token\":\"a\"}\r\n\r\ndata: x");
        assert_eq!(lines, vec!["data: {\"token\":\"a\"}".to_string(), String::new()]);
        assert_eq!(decoder.finish().as_deref(), Some("data: x"));
    }

    #[test]
    fn decoder_reassembles_multibyte_char_split_by_chunks() {
        let bytes = "data: {\"token\":\"caf\u{e9} \u{1f44b}\"}\n".as_bytes();
        let mut decoder = LineDecoder::default();
        let mut lines = Vec::new();
        for byte in bytes {
            lines.extend(decoder.push_chunk(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec!["data: {\"token\":\"caf\u{e9} \u{1f44b}\"}".to_string()]);
    }

    #[test]
    fn parses_token_done_and_error_frames() {
        assert_eq!(
            parse_frame(r#"data: {"token": "Hel"}"#),
            Some(vec![FrameEvent::Token("Hel".into())])
        );
        assert_eq!(
            parse_frame(r#"data: {"token": "x", "done": false}"#),
            Some(vec![FrameEvent::Token("x".into())])
        );
        assert_eq!(parse_frame(r#"data: {"done": true}"#), Some(vec![FrameEvent::Done]));
        assert_eq!(
            parse_frame(r#"data: {"token": "!", "done": true}"#),
            Some(vec![FrameEvent::Token("!".into()), FrameEvent::Done])
        );
        assert_eq!(
            parse_frame(r#"data: {"error": "downstream unavailable"}"#),
            Some(vec![FrameEvent::Error("downstream unavailable".into())])
        );
    }

    #[test]
    fn structured_error_uses_its_message() {
        assert_eq!(
            parse_frame(r#"data: {"error": {"message": "quota exceeded"}}"#),
            Some(vec![FrameEvent::Error("quota exceeded".into())])
        );
        assert_eq!(
            parse_frame(r#"data: {"error": {"code": 7}}"#),
            Some(vec![FrameEvent::Error(GENERIC_STREAM_ERROR.into())])
        );
    }

    #[test]
    fn unset_error_values_do_not_end_the_stream() {
        assert_eq!(
            parse_frame(r#"data: {"token": "x", "error": false}"#),
            Some(vec![FrameEvent::Token("x".into())])
        );
        assert_eq!(parse_frame(r#"data: {"error": ""}"#), Some(vec![]));
        assert_eq!(parse_frame(r#"data: {"error": 0}"#), Some(vec![]));
        assert_eq!(
            parse_frame(r#"data: {"error": null, "done": true}"#),
            Some(vec![FrameEvent::Done])
        );
    }

    #[test]
    fn non_text_error_values_become_generic_message() {
        for payload in [
            r#"data: {"error": ["a", {"b": 1}]}"#,
            r#"data: {"error": 503}"#,
            r#"data: {"error": true}"#,
        ] {
            assert_eq!(
                parse_frame(payload),
                Some(vec![FrameEvent::Error(GENERIC_STREAM_ERROR.into())]),
                "{payload}"
            );
        }
    }

    #[test]
    fn decoder_splits_many_lines_from_one_chunk() {
        let mut body = String::new();
        for i in 0..500 {
            body.push_str(&format!("data: {{\"token\":\"{i}\"}}\n"));
        }
        body.push_str("data: {\"done\"");
        let mut decoder = LineDecoder::default();
        let lines = decoder.push_chunk(body.as_bytes());
        assert_eq!(lines.len(), 500);
        assert_eq!(lines[0], "data: {\"token\":\"0\"}");
        assert_eq!(lines[499], "data: {\"token\":\"499\"}");
        let lines = decoder.push_chunk(b":true}\n");
        assert_eq!(lines, vec!["data: {\"done\":true}".to_string()]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn non_frames_and_bad_json_are_rejected() {
        assert_eq!(parse_frame(""), None);
        assert_eq!(parse_frame(": keep-alive"), None);
        assert_eq!(parse_frame("event: message"), None);
        assert_eq!(parse_frame(r#"data:{"token":"no space"}"#), None);
        assert_eq!(parse_frame("data: [DONE]"), None);
        assert_eq!(parse_frame(r#"data: {"token": "unterminated"#), None);
        assert_eq!(parse_frame(r#"data: {"token": 5}"#), None);
    }

    #[test]
    fn empty_token_and_unknown_fields_yield_no_events() {
        assert_eq!(parse_frame(r#"data: {"token": ""}"#), Some(vec![]));
        assert_eq!(parse_frame(r#"data: {"ping": 1}"#), Some(vec![]));
    }
}
