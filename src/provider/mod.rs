//! Provider adapters.
//!
//! Each vendor family is a closed variant behind one event-producing trait:
//! adding a vendor means adding a variant, never another conditional branch
//! in the relay path. Adapters open exactly one outbound streaming
//! connection and translate the vendor's wire shape into normalized
//! [`RelayEvent`]s; every failure is classified into a [`RelayError`] at
//! this boundary.

pub mod openai;
pub mod textgen;

use crate::config::{GenerationParams, ProviderDescriptor, ProviderFamily};
use crate::error::RelayError;
use crate::types::events::RelayEvent;
use crate::types::message::Message;
use crate::{BoxStream, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Normalized item stream from one provider attempt. The connection is
/// owned by the stream; dropping it releases the connection on every exit
/// path, including cancellation.
pub type AdapterStream = BoxStream<'static, std::result::Result<RelayEvent, RelayError>>;

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Open one outbound streaming connection and yield normalized events
    /// until the connection ends or errors. Open-time failures (bad status,
    /// connect error) are returned as `Err` so the orchestrator can decide
    /// on fallback before anything was forwarded.
    async fn open_stream(
        &self,
        messages: &[Message],
        context_block: Option<&str>,
        params: &GenerationParams,
        request_id: &str,
    ) -> std::result::Result<AdapterStream, RelayError>;
}

/// Construct the adapter variant for a descriptor.
pub fn build_adapter(descriptor: ProviderDescriptor) -> Result<Arc<dyn ProviderAdapter>> {
    Ok(match descriptor.family {
        ProviderFamily::OpenAiSse => Arc::new(openai::OpenAiAdapter::new(descriptor)?),
        ProviderFamily::TextGenNdjson => Arc::new(textgen::TextGenAdapter::new(descriptor)?),
    })
}

/// Classify a non-2xx response, reading whatever body text is available.
pub(crate) async fn classify_response(
    resp: reqwest::Response,
    provider: &str,
) -> std::result::Result<reqwest::Response, RelayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let code = status.as_u16();
    let mut body = resp.text().await.unwrap_or_default();
    truncate_at_char_boundary(&mut body, 2_000);
    Err(RelayError::from_status(code, provider, body))
}

/// `String::truncate` asserts a char boundary; the cut point must back off
/// to one so an arbitrary upstream body can never panic the task.
fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

pub(crate) fn classify_open_error(err: crate::Error, provider: &str) -> RelayError {
    match err {
        crate::Error::Transport(te) => RelayError::from_transport(&te, provider),
        other => RelayError::new(
            crate::ErrorCode::UpstreamHttp,
            format!("{}: {}", provider, other),
        ),
    }
}
