use std::fmt::Display;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::stream::tokenizer::{BackendEvent, EventTokenizer};

/// Why the parse loop stopped reading the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Done,
    EndOfInput,
    ReadError(String),
}

#[derive(Debug)]
pub struct PumpOutcome {
    /// Concatenation of every fragment parsed, in arrival order.
    pub content: String,
    pub fragments: usize,
    pub termination: Termination,
    pub client_disconnected: bool,
}

/// Reads `source` to completion, relaying each fragment's text to `sink` as
/// soon as it is parsed.
///
/// Each write completes before the next read is issued. If the receiving side
/// goes away the loop keeps draining the backend so the returned content is
/// still the full reply. `sink` is dropped on return, which closes the output.
pub async fn pump<S, E>(mut source: S, sink: mpsc::Sender<Bytes>) -> PumpOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut tokenizer = EventTokenizer::new();
    let mut sink = Some(sink);
    let mut content = String::new();
    let mut fragments = 0;

    let termination = loop {
        let chunk = match source.next().await {
            None => break Termination::EndOfInput,
            Some(Err(e)) => {
                warn!("Backend stream read failed: {e}");
                break Termination::ReadError(e.to_string());
            }
            Some(Ok(chunk)) => chunk,
        };

        for event in tokenizer.feed(&chunk) {
            match event {
                BackendEvent::Fragment(fragment) => {
                    content.push_str(&fragment.content);
                    fragments += 1;
                    let delivered = match &sink {
                        Some(tx) => tx.send(Bytes::from(fragment.content)).await.is_ok(),
                        None => true,
                    };
                    if !delivered {
                        debug!("Client went away, draining backend without relaying");
                        sink = None;
                    }
                }
                BackendEvent::BackendError(message) => {
                    warn!("Inference backend reported an error: {message}");
                }
                BackendEvent::Done => {}
            }
        }

        if tokenizer.is_done() {
            break Termination::Done;
        }
    };

    let dropped = tokenizer.finish();
    if dropped > 0 {
        warn!("Backend stream ended inside an event, {dropped} bytes discarded");
    }

    PumpOutcome {
        content,
        fragments,
        termination,
        client_disconnected: sink.is_none(),
    }
}
