//! Provider attempt sequencing.
//!
//! One request walks the ordered provider list. Until the first token has
//! been forwarded, a retryable failure moves to the next provider; once any
//! output reached the caller the active provider is committed and its
//! failure becomes the terminal error. The produced stream always ends in
//! exactly one terminal event and never yields `Err`.

use crate::config::GenerationParams;
use crate::error::{ErrorCode, RelayError};
use crate::metrics::MetricsRecorder;
use crate::provider::{AdapterStream, ProviderAdapter};
use crate::session::StreamSession;
use crate::types::events::RelayEvent;
use crate::types::message::Message;
use crate::BoxStream;
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

pub struct FallbackOrchestrator {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    metrics: Arc<MetricsRecorder>,
    attempt_timeout: Option<Duration>,
}

impl FallbackOrchestrator {
    pub fn new(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        metrics: Arc<MetricsRecorder>,
        attempt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            adapters,
            metrics,
            attempt_timeout,
        }
    }

    /// Run one request to its terminal event.
    ///
    /// The attempt loop runs before the stream is returned: by the time the
    /// caller polls, either a provider has produced its first event or every
    /// provider has been exhausted and the stream is a single error.
    pub async fn run(
        &self,
        messages: Vec<Message>,
        context_block: Option<String>,
        params: GenerationParams,
        mut session: StreamSession,
    ) -> BoxStream<'static, RelayEvent> {
        let request_id = session.request_id.clone();
        let total = self.adapters.len();
        let mut last_err: Option<RelayError> = None;

        for (index, adapter) in self.adapters.iter().enumerate() {
            let name = adapter.descriptor().name.clone();
            let model = adapter.descriptor().model.clone();
            if index > 0 {
                session.advance_provider(index);
                self.metrics.record_fallback_switch();
                tracing::info!(
                    request_id = %request_id,
                    provider = %name,
                    attempt = index + 1,
                    "falling back to next provider"
                );
            }

            let mut upstream = match adapter
                .open_stream(&messages, context_block.as_deref(), &params, &request_id)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    self.metrics.record_provider_error(&name);
                    tracing::warn!(
                        request_id = %request_id,
                        provider = %name,
                        code = %e.code.as_str(),
                        "provider attempt failed to open: {}",
                        e.message
                    );
                    if !e.retryable() {
                        return self.terminal_error(session, e);
                    }
                    last_err = Some(e);
                    continue;
                }
            };

            // Peek the first event under the attempt deadline. No output has
            // been forwarded yet, so a failure here is still eligible for
            // fallback.
            let first = match self.attempt_timeout {
                Some(deadline) => match tokio::time::timeout(deadline, upstream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        drop(upstream);
                        let e = RelayError::new(
                            ErrorCode::UpstreamTimeout,
                            format!("{}: no event within {:?}", name, deadline),
                        );
                        self.metrics.record_provider_error(&name);
                        tracing::warn!(
                            request_id = %request_id,
                            provider = %name,
                            "provider attempt timed out before first event"
                        );
                        last_err = Some(e);
                        continue;
                    }
                },
                None => upstream.next().await,
            };

            match first {
                Some(Err(e)) => {
                    self.metrics.record_provider_error(&name);
                    tracing::warn!(
                        request_id = %request_id,
                        provider = %name,
                        code = %e.code.as_str(),
                        "provider failed before first event: {}",
                        e.message
                    );
                    if !e.retryable() {
                        return self.terminal_error(session, e);
                    }
                    last_err = Some(e);
                    continue;
                }
                Some(Ok(event)) => {
                    tracing::debug!(
                        request_id = %request_id,
                        provider = %name,
                        "provider committed"
                    );
                    return guard(upstream, Some(event), session, self.metrics.clone(), name, model);
                }
                None => {
                    // Stream closed without any event. Treat as an empty
                    // completion from this provider.
                    return guard(upstream, None, session, self.metrics.clone(), name, model);
                }
            }
        }

        tracing::error!(
            request_id = %request_id,
            attempts = total,
            "every provider failed before producing output"
        );
        let details = last_err.map(|e| {
            serde_json::json!({
                "code": e.code.as_str(),
                "message": e.message,
                "status": e.status,
            })
        });
        self.terminal_event(
            session,
            RelayEvent::Error {
                code: ErrorCode::AllProvidersFailed,
                message: "all providers failed".to_string(),
                details,
                retryable: false,
            },
        )
    }

    fn terminal_error(
        &self,
        session: StreamSession,
        err: RelayError,
    ) -> BoxStream<'static, RelayEvent> {
        self.terminal_event(session, RelayEvent::from_relay_error(err))
    }

    fn terminal_event(
        &self,
        mut session: StreamSession,
        event: RelayEvent,
    ) -> BoxStream<'static, RelayEvent> {
        session.mark_terminal();
        Box::pin(stream::once(async move { event }))
    }
}

struct GuardState {
    upstream: AdapterStream,
    pending: Option<std::result::Result<RelayEvent, RelayError>>,
    session: StreamSession,
    metrics: Arc<MetricsRecorder>,
    provider: String,
    model: String,
    closed: bool,
}

/// Post-commit wrapper. Forwards tokens, stamps session facts onto the
/// terminal event, converts a mid-stream failure into a terminal error,
/// and enforces the single-terminal rule by closing after the first one.
fn guard(
    upstream: AdapterStream,
    pending: Option<RelayEvent>,
    session: StreamSession,
    metrics: Arc<MetricsRecorder>,
    provider: String,
    model: String,
) -> BoxStream<'static, RelayEvent> {
    let state = GuardState {
        upstream,
        pending: pending.map(Ok),
        session,
        metrics,
        provider,
        model,
        closed: false,
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if st.closed {
                return None;
            }
            let item = match st.pending.take() {
                Some(item) => Some(item),
                None => st.upstream.next().await,
            };
            match item {
                Some(Ok(RelayEvent::Token { delta, provider })) => {
                    let first = st.session.mark_token();
                    st.metrics.record_token(&provider);
                    if first {
                        if let Some(latency) = st.session.first_token_latency() {
                            st.metrics.record_first_token(&provider, latency);
                        }
                    }
                    return Some((RelayEvent::Token { delta, provider }, st));
                }
                Some(Ok(RelayEvent::Done {
                    provider,
                    model,
                    usage,
                    ..
                })) => {
                    if !st.session.mark_terminal() {
                        return None;
                    }
                    let event = RelayEvent::Done {
                        provider: provider.clone(),
                        model: model.clone(),
                        usage,
                        fallback_used: st.session.fallback_used(),
                        provenance: st.session.take_snippets(),
                    };
                    st.metrics.on_done(&st.session, &provider, &model);
                    st.closed = true;
                    return Some((event, st));
                }
                Some(Ok(event @ RelayEvent::Error { .. })) => {
                    if !st.session.mark_terminal() {
                        return None;
                    }
                    st.metrics.record_provider_error(&st.provider);
                    st.closed = true;
                    return Some((event, st));
                }
                Some(Ok(RelayEvent::Heartbeat)) => continue,
                Some(Err(e)) => {
                    st.metrics.record_provider_error(&st.provider);
                    if !st.session.mark_terminal() {
                        return None;
                    }
                    tracing::warn!(
                        request_id = %st.session.request_id,
                        provider = %st.provider,
                        code = %e.code.as_str(),
                        "committed provider failed mid-stream: {}",
                        e.message
                    );
                    st.closed = true;
                    return Some((RelayEvent::from_relay_error(e), st));
                }
                None => {
                    if !st.session.mark_terminal() {
                        return None;
                    }
                    let event = RelayEvent::Done {
                        provider: st.provider.clone(),
                        model: st.model.clone(),
                        usage: Default::default(),
                        fallback_used: st.session.fallback_used(),
                        provenance: st.session.take_snippets(),
                    };
                    st.metrics.on_done(&st.session, &st.provider, &st.model);
                    st.closed = true;
                    return Some((event, st));
                }
            }
        }
    }))
}
