//! `<think>` block detection in streamed model output
//!
//! Reasoning models interleave a `<think>...</think>` trace with the
//! visible answer. The detector splits a raw character stream into
//! deltas tagged with whether they belong to the trace, independent of
//! how the upstream chunks happened to be cut. To avoid emitting half a
//! tag, the last 8 bytes (the length of `</think>`) stay buffered until
//! the stream ends.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde::Serialize;

use crate::client::ChatChunkStream;

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Bytes withheld from release while a partial tag may still complete
const TAG_BUFFER: usize = CLOSE_TAG.len();

/// One event in a think-detected stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Incremental content, tagged by think-trace membership
    Delta {
        content: String,
        #[serde(rename = "isThink")]
        is_think: bool,
    },
    /// Upstream failure; always followed by a terminal `Done`
    Error { code: String, message: String },
    /// Stream has completed
    Done,
}

impl StreamEvent {
    /// Build the standard error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            code: "AI_STREAM_ERROR".to_owned(),
            message: message.into(),
        }
    }

    const fn delta(content: String, is_think: bool) -> Self {
        Self::Delta { content, is_think }
    }
}

/// Incremental `<think>` span detector
#[derive(Debug, Default)]
pub struct ThinkDetector {
    buffer: String,
    in_think: bool,
}

impl ThinkDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the deltas that are safe to release
    ///
    /// A released prefix is guaranteed not to contain the beginning of
    /// an unconfirmed tag; everything else stays buffered for the next
    /// chunk or [`Self::finish`].
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while self.buffer.len() > TAG_BUFFER {
            let tag = if self.in_think { CLOSE_TAG } else { OPEN_TAG };

            match self.buffer.find(tag) {
                // Tag confirmed with enough lookahead behind it
                Some(start) if start + TAG_BUFFER < self.buffer.len() => {
                    if start > 0 {
                        let content: String = self.buffer.drain(..start).collect();
                        events.push(StreamEvent::delta(content, self.in_think));
                    }
                    self.buffer.drain(..tag.len());
                    self.in_think = !self.in_think;
                }
                // No tag in sight: release all but the withheld tail
                None => {
                    let safe = floor_char_boundary(&self.buffer, self.buffer.len() - TAG_BUFFER);
                    if safe > 0 {
                        let content: String = self.buffer.drain(..safe).collect();
                        events.push(StreamEvent::delta(content, self.in_think));
                    }
                    break;
                }
                // Tag found too close to the end; wait for more data
                Some(_) => break,
            }
        }

        events
    }

    /// Flush whatever remains buffered once the stream has ended
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }

        let content = std::mem::take(&mut self.buffer);
        Some(StreamEvent::delta(content, self.in_think))
    }
}

/// Largest char boundary at or below `index`
fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Wrap a raw chunk stream in think detection
///
/// The returned stream always ends with a `Done` event; an upstream
/// error yields an `Error` event first and drops any withheld buffer.
pub fn detect_think_stream(inner: ChatChunkStream) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send>> {
    struct DetectState {
        inner: ChatChunkStream,
        detector: ThinkDetector,
        queue: VecDeque<StreamEvent>,
        ending: bool,
        done: bool,
    }

    let state = DetectState {
        inner,
        detector: ThinkDetector::new(),
        queue: VecDeque::new(),
        ending: false,
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }
            if state.ending {
                state.done = true;
                return Some((StreamEvent::Done, state));
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.queue.extend(state.detector.push(&chunk));
                }
                Some(Err(e)) => {
                    state.queue.push_back(StreamEvent::error(e.to_string()));
                    state.ending = true;
                }
                None => {
                    if let Some(event) = state.detector.finish() {
                        state.queue.push_back(event);
                    }
                    state.ending = true;
                }
            }
        }
    }))
}
