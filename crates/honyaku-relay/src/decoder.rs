//! Incremental decoder for the upstream event-frame protocol.
//!
//! The upstream body is a sequence of frames separated by a blank line. Each
//! frame carries its payload on `data:` lines; the payload is either the
//! literal `[DONE]` or a JSON object with an incremental text field:
//!
//! ```text
//! data: {"delta":"He"}\n\n
//! data: {"choices":[{"delta":{"content":"llo"}}]}\n\n
//! data: [DONE]\n\n
//! ```
//!
//! Transport chunks have no relation to frame boundaries, so the decoder
//! carries partial frames (and partial UTF-8 sequences) over to the next
//! call. The decoder never fails: a frame that does not parse is dropped and
//! the stream goes on. Only the relay session produces `Error` events, from
//! transport failures.

use honyaku_types::{RequestTag, StreamEvent};
use serde_json::Value;

use crate::constants::{DATA_PREFIX, DONE_SENTINEL, FRAME_DELIMITER};

/// Stateful frame decoder for one [`RequestTag`].
#[derive(Debug)]
pub struct ChunkDecoder {
    tag: RequestTag,
    /// Text not yet terminated by a frame delimiter.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    utf8_tail: Vec<u8>,
    /// Concatenation of every emitted delta.
    full_text: String,
    /// Set once a terminal event was produced; later input is ignored.
    finished: bool,
    dropped_frames: usize,
}

impl ChunkDecoder {
    pub fn new(tag: RequestTag) -> Self {
        Self {
            tag,
            buffer: String::new(),
            utf8_tail: Vec::new(),
            full_text: String::new(),
            finished: false,
            dropped_frames: 0,
        }
    }

    pub fn tag(&self) -> RequestTag {
        self.tag
    }

    /// Text accumulated from all deltas so far.
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Whether a terminal event has been emitted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Frames that failed to parse and were skipped.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    /// Feed raw body bytes. Multi-byte characters split across calls are
    /// reassembled before decoding.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut pending = std::mem::take(&mut self.utf8_tail);
        pending.extend_from_slice(bytes);
        let cut = incomplete_suffix_start(&pending);
        let text = String::from_utf8_lossy(&pending[..cut]).into_owned();
        self.utf8_tail = pending[cut..].to_vec();
        self.feed(&text)
    }

    /// Feed a text chunk; returns the events completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.buffer.push_str(chunk);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        while let Some(pos) = self.buffer.find(FRAME_DELIMITER) {
            let frame: String = self.buffer.drain(..pos + FRAME_DELIMITER.len()).collect();
            self.process_frame(&frame[..pos], &mut events);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Flush after the transport closed.
    ///
    /// A trailing frame without its blank line is still decoded. Without a
    /// terminator, a `Done` is synthesized from the accumulated text, or an
    /// `Error` when the transport failed and nothing was accumulated.
    pub fn finish(&mut self, transport_failure: Option<&str>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.replace("\r\n", "\n");
        if !rest.trim().is_empty() {
            self.process_frame(rest.trim_end_matches('\n'), &mut events);
        }

        if !self.finished {
            self.finished = true;
            match transport_failure {
                Some(reason) if self.full_text.is_empty() => {
                    events.push(StreamEvent::error(self.tag, reason, None));
                }
                _ => {
                    if let Some(reason) = transport_failure {
                        tracing::debug!(tag = %self.tag.short(), %reason, "transport failed after partial output, completing with it");
                    }
                    events.push(StreamEvent::done(self.tag, self.full_text.clone()));
                }
            }
        }
        events
    }

    fn process_frame(&mut self, frame: &str, events: &mut Vec<StreamEvent>) {
        let Some(payload) = frame_payload(frame) else {
            return;
        };

        if payload.trim() == DONE_SENTINEL {
            self.finished = true;
            events.push(StreamEvent::done(self.tag, self.full_text.clone()));
            return;
        }

        match serde_json::from_str::<Value>(&payload) {
            Ok(value) => {
                if let Some(text) = extract_fragment(&value).filter(|t| !t.is_empty()) {
                    self.full_text.push_str(text);
                    events.push(StreamEvent::delta(self.tag, text));
                }
            }
            Err(e) => {
                self.dropped_frames += 1;
                tracing::debug!(tag = %self.tag.short(), error = %e, "dropping malformed frame");
            }
        }
    }
}

/// Join the `data:` lines of a frame. `None` when the frame carries no data
/// (comments, `event:`/`id:` only, keep-alives).
fn frame_payload(frame: &str) -> Option<String> {
    let mut lines = frame
        .split('\n')
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .peekable();
    lines.peek()?;
    Some(lines.collect::<Vec<_>>().join("\n"))
}

/// Text fragment of a payload: a top-level `delta` string, else the
/// OpenAI-compatible `choices[0].delta.content`.
fn extract_fragment(value: &Value) -> Option<&str> {
    if let Some(delta) = value.get("delta").and_then(Value::as_str) {
        return Some(delta);
    }
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

/// Index where a trailing, not yet complete UTF-8 sequence starts
/// (`bytes.len()` when the input ends on a character boundary).
fn incomplete_suffix_start(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let b = bytes[len - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = if b & 0b1110_0000 == 0b1100_0000 {
            2
        } else if b & 0b1111_0000 == 0b1110_0000 {
            3
        } else if b & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            1
        };
        return if needed > back { len - back } else { len };
    }
    len
}
