//! Normalized streaming events shared by every provider adapter.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A retrieved supporting snippet, read-only once fetched.
///
/// Attached to the terminal `Done` event as provenance so callers can link
/// the generated answer back to its sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<i64>,
}

/// Unified relay event.
///
/// `Token` and the two terminal variants (`Done`, `Error`) are semantic;
/// `Heartbeat` is a transport keep-alive and is never delivered to callers
/// as a semantic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    Token {
        delta: String,
        provider: String,
    },
    Done {
        provider: String,
        model: String,
        #[serde(default)]
        usage: HashMap<String, f64>,
        fallback_used: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provenance: Option<Vec<Snippet>>,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
        retryable: bool,
    },
    Heartbeat,
}

impl RelayEvent {
    /// Synthetic completion marker for streams that end without usage data.
    pub fn done_without_usage(provider: impl Into<String>, model: impl Into<String>) -> Self {
        RelayEvent::Done {
            provider: provider.into(),
            model: model.into(),
            usage: HashMap::new(),
            fallback_used: false,
            provenance: None,
        }
    }

    pub fn from_relay_error(err: crate::error::RelayError) -> Self {
        let retryable = err.retryable();
        RelayEvent::Error {
            code: err.code,
            message: err.message,
            details: err.details,
            retryable,
        }
    }

    /// A session forwards exactly one terminal event; nothing follows it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayEvent::Done { .. } | RelayEvent::Error { .. })
    }

    pub fn is_token(&self) -> bool {
        matches!(self, RelayEvent::Token { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_detection() {
        assert!(RelayEvent::done_without_usage("openai", "gpt-4o").is_terminal());
        assert!(RelayEvent::Error {
            code: ErrorCode::Upstream5xx,
            message: "boom".into(),
            details: None,
            retryable: true,
        }
        .is_terminal());
        assert!(!RelayEvent::Token {
            delta: "hi".into(),
            provider: "openai".into(),
        }
        .is_terminal());
        assert!(!RelayEvent::Heartbeat.is_terminal());
    }

    #[test]
    fn snippet_roundtrip_keeps_identity_fields() {
        let s = Snippet {
            text: "Rust is a systems language".into(),
            source_url: Some("https://example.com/doc".into()),
            score: 0.87,
            doc_id: Some("doc-17".into()),
            chunk_id: Some(4),
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: Snippet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
