//! Line-oriented event-stream codec.
//!
//! Decoding is stateful: bytes arrive in arbitrary chunks, frames are
//! delimited by a blank line, and the incomplete trailing frame is retained
//! until the next chunk. Splits may land mid-line, mid-field, or exactly on
//! the frame boundary. The NDJSON sibling (`LineDecoder`) covers vendors
//! that stream bare JSON objects one per line.

use crate::error::ErrorCode;
use crate::types::events::{RelayEvent, Snippet};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const FRAME_DELIMITER: &[u8] = b"\n\n";

/// One complete decoded frame. Comment lines (`:` prefix) are transport
/// heartbeats and are dropped during parsing; a frame consisting only of
/// comments is dropped entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: Option<String>,
    pub data: String,
}

/// Stateful frame splitter. The buffer holds raw bytes so a chunk split
/// inside a multi-byte UTF-8 sequence cannot corrupt the frame text.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, draining every complete frame it unlocked.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(idx) = find_delimiter(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..idx + FRAME_DELIMITER.len()).collect();
            let text = String::from_utf8_lossy(&raw[..idx]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush the remainder at end of stream.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&raw);
        parse_frame(text.trim_end_matches('\n'))
    }

    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_DELIMITER.len())
        .position(|w| w == FRAME_DELIMITER)
}

fn parse_frame(raw: &str) -> Option<Frame> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(Frame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Stateful line splitter for newline-delimited JSON streams. Blank lines
/// are skipped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=idx).collect();
            let line = String::from_utf8_lossy(&raw[..idx]);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

// Client-facing wire payloads. The frame name carries the event kind; the
// payload carries only the fields.
#[derive(Serialize, Deserialize)]
struct TokenPayload {
    delta: String,
    provider: String,
}

#[derive(Serialize, Deserialize)]
struct DonePayload {
    provider: String,
    model: String,
    #[serde(default)]
    usage: HashMap<String, f64>,
    #[serde(default)]
    fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provenance: Option<Vec<Snippet>>,
}

#[derive(Serialize, Deserialize)]
struct ErrorPayload {
    code: ErrorCode,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(default)]
    retryable: bool,
}

pub const EVENT_TOKEN: &str = "llm.token";
pub const EVENT_DONE: &str = "llm.done";
pub const EVENT_ERROR: &str = "error";

/// Encode one event as a wire frame.
///
/// `event: <name>` then one `data: <line>` per payload line (a single
/// `data:` field cannot carry a raw newline), blank-line terminated.
/// Heartbeats encode as a comment frame.
pub fn encode_event(event: &RelayEvent) -> Bytes {
    let (name, payload) = match event {
        RelayEvent::Heartbeat => return Bytes::from_static(b": heartbeat\n\n"),
        RelayEvent::Token { delta, provider } => (
            EVENT_TOKEN,
            serde_json::to_string(&TokenPayload {
                delta: delta.clone(),
                provider: provider.clone(),
            }),
        ),
        RelayEvent::Done {
            provider,
            model,
            usage,
            fallback_used,
            provenance,
        } => (
            EVENT_DONE,
            serde_json::to_string(&DonePayload {
                provider: provider.clone(),
                model: model.clone(),
                usage: usage.clone(),
                fallback_used: *fallback_used,
                provenance: provenance.clone(),
            }),
        ),
        RelayEvent::Error {
            code,
            message,
            details,
            retryable,
        } => (
            EVENT_ERROR,
            serde_json::to_string(&ErrorPayload {
                code: *code,
                message: message.clone(),
                details: details.clone(),
                retryable: *retryable,
            }),
        ),
    };
    let payload = payload.unwrap_or_else(|_| "{}".to_string());
    let mut out = String::with_capacity(payload.len() + name.len() + 16);
    out.push_str("event: ");
    out.push_str(name);
    out.push('\n');
    for line in payload.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    Bytes::from(out)
}

/// Parse a relay frame back into an event. Used by the aggregate collector
/// and by conformant client parsers; unknown frame names yield `None`.
pub fn parse_event(frame: &Frame) -> Option<RelayEvent> {
    match frame.event.as_deref() {
        Some(EVENT_TOKEN) => {
            let p: TokenPayload = serde_json::from_str(&frame.data).ok()?;
            Some(RelayEvent::Token {
                delta: p.delta,
                provider: p.provider,
            })
        }
        Some(EVENT_DONE) => {
            let p: DonePayload = serde_json::from_str(&frame.data).ok()?;
            Some(RelayEvent::Done {
                provider: p.provider,
                model: p.model,
                usage: p.usage,
                fallback_used: p.fallback_used,
                provenance: p.provenance,
            })
        }
        Some(EVENT_ERROR) => {
            let p: ErrorPayload = serde_json::from_str(&frame.data).ok()?;
            Some(RelayEvent::Error {
                code: p.code,
                message: p.message,
                details: p.details,
                retryable: p.retryable,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests;
