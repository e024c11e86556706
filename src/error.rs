use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level failure taxonomy.
///
/// Every upstream failure is translated into one of these codes at the
/// adapter boundary; raw transport errors never reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "RATE_LIMIT")]
    RateLimit,
    #[serde(rename = "UPSTREAM_5XX")]
    Upstream5xx,
    #[serde(rename = "UPSTREAM_TIMEOUT")]
    UpstreamTimeout,
    #[serde(rename = "UPSTREAM_HTTP")]
    UpstreamHttp,
    #[serde(rename = "UPSTREAM_4XX")]
    Upstream4xx,
    #[serde(rename = "PARSE_ERROR")]
    ParseError,
    #[serde(rename = "ALL_PROVIDERS_FAILED")]
    AllProvidersFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::Upstream5xx => "UPSTREAM_5XX",
            ErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ErrorCode::UpstreamHttp => "UPSTREAM_HTTP",
            ErrorCode::Upstream4xx => "UPSTREAM_4XX",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::AllProvidersFailed => "ALL_PROVIDERS_FAILED",
        }
    }

    /// Whether a failure with this code may trigger a fallback attempt.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimit
                | ErrorCode::Upstream5xx
                | ErrorCode::UpstreamTimeout
                | ErrorCode::UpstreamHttp
        )
    }

    /// Classify an upstream HTTP status. Callers handle 2xx before this.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ErrorCode::RateLimit,
            s if s >= 500 => ErrorCode::Upstream5xx,
            s if (400..500).contains(&s) => ErrorCode::Upstream4xx,
            _ => ErrorCode::UpstreamHttp,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified provider failure.
///
/// Produced by adapters for both open-time failures (bad status, connect
/// error) and mid-stream failures (stalls, malformed payloads).
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct RelayError {
    pub code: ErrorCode,
    pub message: String,
    pub status: Option<u16>,
    pub details: Option<serde_json::Value>,
}

impl RelayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Classify an upstream status plus whatever body text was readable.
    pub fn from_status(status: u16, provider: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        let code = ErrorCode::from_status(status);
        let mut err =
            Self::new(code, format!("{} returned HTTP {}", provider, status)).with_status(status);
        if !body.is_empty() {
            err = err.with_details(serde_json::json!({ "body": body }));
        }
        err
    }

    /// Classify a transport-level failure from the HTTP client.
    pub fn from_transport(err: &reqwest::Error, provider: &str) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::UpstreamTimeout
        } else {
            ErrorCode::UpstreamHttp
        };
        Self::new(code, format!("{}: {}", provider, err))
    }

    pub fn retryable(&self) -> bool {
        self.code.retryable()
    }
}

/// Unified error type for the relay runtime.
#[derive(Debug, Error)]
pub enum Error {
    #[error("provider error: {0}")]
    Provider(#[from] RelayError),

    /// Every configured provider failed before a token was forwarded.
    #[error("all configured providers failed")]
    AllProvidersFailed { last: Option<RelayError> },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// The wire-level code this error maps to, when it has one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Provider(e) => Some(e.code),
            Error::AllProvidersFailed { .. } => Some(ErrorCode::AllProvidersFailed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_taxonomy() {
        assert_eq!(ErrorCode::from_status(429), ErrorCode::RateLimit);
        assert_eq!(ErrorCode::from_status(500), ErrorCode::Upstream5xx);
        assert_eq!(ErrorCode::from_status(503), ErrorCode::Upstream5xx);
        assert_eq!(ErrorCode::from_status(400), ErrorCode::Upstream4xx);
        assert_eq!(ErrorCode::from_status(404), ErrorCode::Upstream4xx);
    }

    #[test]
    fn retryable_split() {
        for code in [
            ErrorCode::RateLimit,
            ErrorCode::Upstream5xx,
            ErrorCode::UpstreamTimeout,
            ErrorCode::UpstreamHttp,
        ] {
            assert!(code.retryable(), "{code} should be retryable");
        }
        for code in [ErrorCode::Upstream4xx, ErrorCode::ParseError] {
            assert!(!code.retryable(), "{code} should not be retryable");
        }
    }

    #[test]
    fn codes_serialize_to_wire_names() {
        let json = serde_json::to_string(&ErrorCode::Upstream5xx).unwrap();
        assert_eq!(json, "\"UPSTREAM_5XX\"");
        let back: ErrorCode = serde_json::from_str("\"RATE_LIMIT\"").unwrap();
        assert_eq!(back, ErrorCode::RateLimit);
    }
}
