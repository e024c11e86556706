//! Per-provider counters and the analytics sink.
//!
//! Counters are plain atomics readable at any time; analytics records go
//! through an injected [`AnalyticsSink`] backed by a bounded queue, so a
//! slow or dead collector can never stall the token path.

use crate::config::AnalyticsConfig;
use crate::session::StreamSession;
use crate::transport::http::build_client;
use crate::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
pub struct ProviderCounters {
    pub tokens: AtomicU64,
    pub errors: AtomicU64,
    pub first_token_count: AtomicU64,
    pub first_token_micros: AtomicU64,
}

impl ProviderCounters {
    /// Mean time-to-first-token across completed attempts.
    pub fn avg_first_token_latency_ms(&self) -> Option<f64> {
        let count = self.first_token_count.load(Ordering::Relaxed);
        if count == 0 {
            return None;
        }
        let micros = self.first_token_micros.load(Ordering::Relaxed);
        Some(micros as f64 / count as f64 / 1_000.0)
    }
}

/// One analytics record. `data` is schemaless; the collector indexes on
/// `event`.
#[derive(Debug, Clone)]
pub struct AnalyticsEvent {
    pub event: String,
    pub data: serde_json::Value,
}

/// Fire-and-forget analytics boundary. `record` must never block the
/// streaming path; dropping records under pressure is the contract.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: AnalyticsEvent);

    /// Stop accepting records and let any background worker drain out.
    fn close(&self) {}
}

/// Discards everything. The default when no collector is configured.
#[derive(Debug, Default)]
pub struct NoopAnalyticsSink;

impl AnalyticsSink for NoopAnalyticsSink {
    fn record(&self, _event: AnalyticsEvent) {}
}

/// Ships records to an HTTP collector from a background task. The channel
/// is bounded; `try_send` drops the record when the worker is behind. The
/// worker exits once every sender is gone, so `close` (or dropping the
/// sink) lets it drain and stop.
pub struct HttpAnalyticsSink {
    tx: std::sync::Mutex<Option<mpsc::Sender<AnalyticsEvent>>>,
}

impl HttpAnalyticsSink {
    pub fn spawn(config: &AnalyticsConfig) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<AnalyticsEvent>(config.queue_capacity);
        let client = build_client(&Default::default())?;
        let endpoint = config.endpoint.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let body = serde_json::json!({ "event": event.event, "data": event.data });
                if let Err(e) = client.post(endpoint.clone()).json(&body).send().await {
                    tracing::debug!(error = %e, event = %event.event, "analytics delivery failed");
                }
            }
        });
        Ok(Self {
            tx: std::sync::Mutex::new(Some(tx)),
        })
    }
}

impl AnalyticsSink for HttpAnalyticsSink {
    fn record(&self, event: AnalyticsEvent) {
        let guard = self.tx.lock().unwrap();
        let Some(tx) = guard.as_ref() else { return };
        if let Err(mpsc::error::TrySendError::Full(dropped)) = tx.try_send(event) {
            tracing::debug!(event = %dropped.event, "analytics queue full, record dropped");
        }
    }

    fn close(&self) {
        self.tx.lock().unwrap().take();
    }
}

/// Shared recorder handed to the orchestrator. Provider slots are created
/// up front from the configured names, so the hot path never takes a write
/// lock.
pub struct MetricsRecorder {
    providers: HashMap<String, ProviderCounters>,
    fallback_switches: AtomicU64,
    analytics: Arc<dyn AnalyticsSink>,
}

impl MetricsRecorder {
    pub fn new(provider_names: &[String], analytics: Arc<dyn AnalyticsSink>) -> Self {
        let providers = provider_names
            .iter()
            .map(|n| (n.clone(), ProviderCounters::default()))
            .collect();
        Self {
            providers,
            fallback_switches: AtomicU64::new(0),
            analytics,
        }
    }

    pub fn noop(provider_names: &[String]) -> Self {
        Self::new(provider_names, Arc::new(NoopAnalyticsSink))
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderCounters> {
        self.providers.get(name)
    }

    pub fn fallback_switches(&self) -> u64 {
        self.fallback_switches.load(Ordering::Relaxed)
    }

    pub fn record_token(&self, provider: &str) {
        if let Some(c) = self.providers.get(provider) {
            c.tokens.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_first_token(&self, provider: &str, latency: std::time::Duration) {
        if let Some(c) = self.providers.get(provider) {
            c.first_token_count.fetch_add(1, Ordering::Relaxed);
            c.first_token_micros
                .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        }
    }

    pub fn record_provider_error(&self, provider: &str) {
        if let Some(c) = self.providers.get(provider) {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_fallback_switch(&self) {
        self.fallback_switches.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the analytics sink. Counters stay readable.
    pub fn close(&self) {
        self.analytics.close();
    }

    /// Terminal-event hook: closes out the session record.
    pub fn on_done(&self, session: &StreamSession, provider: &str, model: &str) {
        let first_token_latency_ms = session
            .first_token_latency()
            .map(|d| d.as_millis() as u64);
        self.analytics.record(AnalyticsEvent {
            event: "llm_complete".to_string(),
            data: serde_json::json!({
                "request_id": session.request_id,
                "provider": provider,
                "model": model,
                "tokens": session.token_count(),
                "first_token_latency_ms": first_token_latency_ms,
                "fallback_used": session.fallback_used(),
                "elapsed_ms": session.elapsed().as_millis() as u64,
            }),
        });
    }
}
