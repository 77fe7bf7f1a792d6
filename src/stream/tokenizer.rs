//! Incremental tokenizer for the inference backend's event stream.
//!
//! The backend writes blank-line-delimited events of the form
//! `data: {"content": "..."}` and finishes with `data: [DONE]`. Reads may split
//! an event (or a multi-byte character) anywhere; the tokenizer keeps the
//! unterminated tail between calls so the decoded events are the same however
//! the input was chunked.

use serde::Deserialize;
use tracing::warn;

use crate::errors::AppError;
use crate::models::StreamFragment;

const EVENT_DELIMITER: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Fragment(StreamFragment),
    /// Generation failed on the backend side; the message is informational.
    BackendError(String),
    /// Terminator sentinel; nothing after it is decoded.
    Done,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default)]
pub struct EventTokenizer {
    pending: Vec<u8>,
    done: bool,
}

impl EventTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds the next read and returns every event it completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<BackendEvent> {
        if self.done {
            return Vec::new();
        }
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = find_delimiter(&self.pending[start..]) {
            let segment = String::from_utf8_lossy(&self.pending[start..start + offset]).into_owned();
            start += offset + EVENT_DELIMITER.len();

            match parse_event(&segment) {
                Ok(Some(BackendEvent::Done)) => {
                    events.push(BackendEvent::Done);
                    self.done = true;
                    self.pending.clear();
                    return events;
                }
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!("Skipping stream event: {e}"),
            }
        }
        self.pending.drain(..start);
        events
    }

    /// Ends the input. An unterminated trailing segment is never emitted;
    /// returns its length so callers can report truncation.
    pub fn finish(&mut self) -> usize {
        let dropped = if self.done { 0 } else { self.pending.len() };
        self.pending.clear();
        self.done = true;
        dropped
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(EVENT_DELIMITER.len())
        .position(|w| w == EVENT_DELIMITER)
}

/// Decodes one complete segment. `Ok(None)` for segments that carry nothing
/// to relay (not a data line, or a payload without content).
pub fn parse_event(segment: &str) -> Result<Option<BackendEvent>, AppError> {
    let Some(data) = segment.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(Some(BackendEvent::Done));
    }

    let payload: EventPayload = serde_json::from_str(data).map_err(|e| AppError::EventParse {
        event: data.chars().take(120).collect(),
        reason: e.to_string(),
    })?;

    if let Some(content) = payload.content.filter(|c| !c.is_empty()) {
        return Ok(Some(BackendEvent::Fragment(StreamFragment { content })));
    }
    Ok(payload.error.map(BackendEvent::BackendError))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONVERSATION: &str = concat!(
        "data: {\"content\":\"Xin chào\"}\n\n",
        "data: {\"content\":\" – ünïcödé 👋\"}\n\n",
        ": keep-alive comment\n\n",
        "data: {\"content\":\"!\"}\n\n",
        "data: [DONE]\n\n",
    );

    fn fragments(events: &[BackendEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Fragment(f) => Some(f.content.clone()),
                _ => None,
            })
            .collect()
    }

    fn feed_in_chunks(input: &[u8], splits: &[usize]) -> Vec<BackendEvent> {
        let mut tokenizer = EventTokenizer::new();
        let mut events = Vec::new();
        let mut last = 0;
        for &split in splits {
            events.extend(tokenizer.feed(&input[last..split]));
            last = split;
        }
        events.extend(tokenizer.feed(&input[last..]));
        tokenizer.finish();
        events
    }

    #[test]
    fn test_whole_input_in_one_read() {
        let events = feed_in_chunks(CONVERSATION.as_bytes(), &[]);
        assert_eq!(fragments(&events), vec!["Xin chào", " – ünïcödé 👋", "!"]);
        assert_eq!(events.last(), Some(&BackendEvent::Done));
    }

    #[test]
    fn test_every_single_split_point_yields_same_events() {
        let input = CONVERSATION.as_bytes();
        let expected = feed_in_chunks(input, &[]);
        for split in 0..=input.len() {
            assert_eq!(feed_in_chunks(input, &[split]), expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time_yields_same_events() {
        let input = CONVERSATION.as_bytes();
        let splits: Vec<usize> = (1..input.len()).collect();
        assert_eq!(feed_in_chunks(input, &splits), feed_in_chunks(input, &[]));
    }

    #[test]
    fn test_done_ignores_everything_after_it() {
        let mut tokenizer = EventTokenizer::new();
        let events = tokenizer.feed(
            b"data: {\"content\":\"a\"}\n\ndata: [DONE]\n\ndata: {\"content\":\"late\"}\n\n",
        );
        assert_eq!(fragments(&events), vec!["a"]);
        assert!(tokenizer.is_done());
        assert!(tokenizer.feed(b"data: {\"content\":\"later\"}\n\n").is_empty());
    }

    #[test]
    fn test_malformed_event_is_skipped() {
        let mut tokenizer = EventTokenizer::new();
        let events = tokenizer.feed(
            b"data: {\"content\":\"a\"}\n\ndata: {not json}\n\ndata: {\"content\":\"b\"}\n\n",
        );
        assert_eq!(fragments(&events), vec!["a", "b"]);
    }

    #[test]
    fn test_incomplete_tail_is_kept_until_delimiter() {
        let mut tokenizer = EventTokenizer::new();
        assert!(tokenizer.feed(b"data: {\"content\":\"par").is_empty());
        assert!(tokenizer.feed(b"tial\"}\n").is_empty());
        let events = tokenizer.feed(b"\n");
        assert_eq!(fragments(&events), vec!["partial"]);
    }

    #[test]
    fn test_finish_drops_unterminated_tail() {
        let mut tokenizer = EventTokenizer::new();
        tokenizer.feed(b"data: {\"content\":\"never\"}");
        assert_eq!(tokenizer.finish(), "data: {\"content\":\"never\"}".len());
    }

    #[test]
    fn test_backend_error_payload() {
        assert_eq!(
            parse_event("data: {\"error\":\"model crashed\"}").unwrap(),
            Some(BackendEvent::BackendError("model crashed".to_string()))
        );
    }

    #[test]
    fn test_non_data_and_empty_content_carry_nothing() {
        assert_eq!(parse_event("event: ping").unwrap(), None);
        assert_eq!(parse_event("data: {\"content\":\"\"}").unwrap(), None);
        assert_eq!(parse_event("data:{\"other\":1}").unwrap(), None);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = parse_event("data: [1, 2").unwrap_err();
        assert!(matches!(err, AppError::EventParse { .. }));
    }
}
