//! The relay service: request validation, retrieval, orchestration, and the
//! streaming/aggregate front doors.

use crate::augment::{context_block, ContextAugmentor, RetrievalClient};
use crate::config::{GenerationParams, RelayConfig};
use crate::error::{Error, ErrorCode, RelayError};
use crate::metrics::{AnalyticsSink, HttpAnalyticsSink, MetricsRecorder, NoopAnalyticsSink};
use crate::orchestrator::FallbackOrchestrator;
use crate::provider::{build_adapter, ProviderAdapter};
use crate::relay::control::{controlled, CancelHandle, ControlledStream};
use crate::relay::forward::forward_with_heartbeats;
use crate::session::StreamSession;
use crate::types::events::RelayEvent;
use crate::types::message::{ChatRequest, ChatResponse};
use crate::{BoxStream, Result};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

pub struct RelayService {
    orchestrator: FallbackOrchestrator,
    augmentor: Option<ContextAugmentor>,
    metrics: Arc<MetricsRecorder>,
    heartbeat_interval: Duration,
    generation: GenerationParams,
}

impl RelayService {
    pub fn builder(config: RelayConfig) -> RelayServiceBuilder {
        RelayServiceBuilder::new(config)
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Stop the analytics worker. In-flight streams are unaffected.
    pub fn shutdown(&self) {
        self.metrics.close();
    }

    /// Normalized event stream for one request. Retrieval (when enabled)
    /// happens before the first provider attempt; its snippets ride the
    /// session into the terminal event.
    pub async fn chat_events(&self, request: ChatRequest) -> Result<BoxStream<'static, RelayEvent>> {
        if request.is_empty() {
            return Err(Error::InvalidRequest(
                "request has no query and no messages".to_string(),
            ));
        }
        let mut session = StreamSession::new();
        tracing::info!(request_id = %session.request_id, "relay request accepted");

        let mut block = None;
        if let Some(augmentor) = &self.augmentor {
            let query = request.query_text();
            if augmentor.should_retrieve(query, request.use_rag) {
                let snippets = augmentor.augment(query).await;
                block = context_block(&snippets);
                session.attach_snippets(snippets);
            }
        }

        let mut params = self.generation.clone();
        if let Some(t) = request.temperature {
            params.temperature = t;
        }
        if let Some(m) = request.max_tokens {
            params.max_tokens = m;
        }
        if request.model.is_some() {
            params.model = request.model.clone();
        }

        Ok(self
            .orchestrator
            .run(request.conversation(), block, params, session)
            .await)
    }

    /// Wire-encoded stream with heartbeats, plus a cancellation handle.
    /// Cancelling drops the stream, which releases the upstream connection.
    pub async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<(ControlledStream<BoxStream<'static, Bytes>>, CancelHandle)> {
        let events = self.chat_events(request).await?;
        let wire = forward_with_heartbeats(events, self.heartbeat_interval);
        Ok(controlled(wire))
    }

    /// Aggregate mode: collect the stream server-side and return the full
    /// answer. A terminal error event surfaces as `Err`.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut events = self.chat_events(request).await?;
        let mut output = String::new();
        while let Some(event) = events.next().await {
            match event {
                RelayEvent::Token { delta, .. } => output.push_str(&delta),
                RelayEvent::Done {
                    provider,
                    model,
                    usage,
                    fallback_used,
                    provenance,
                } => {
                    return Ok(ChatResponse {
                        provider,
                        model,
                        output,
                        usage,
                        fallback_used,
                        provenance,
                    });
                }
                RelayEvent::Error {
                    code,
                    message,
                    details,
                    ..
                } => {
                    if code == ErrorCode::AllProvidersFailed {
                        let last = details.map(|d| {
                            RelayError::new(ErrorCode::AllProvidersFailed, message.clone())
                                .with_details(d)
                        });
                        return Err(Error::AllProvidersFailed { last });
                    }
                    let mut err = RelayError::new(code, message);
                    if let Some(details) = details {
                        err = err.with_details(details);
                    }
                    return Err(Error::Provider(err));
                }
                RelayEvent::Heartbeat => {}
            }
        }
        // The orchestrator always ends with a terminal event; reaching here
        // means the stream was dropped mid-flight.
        Err(Error::InvalidRequest(
            "stream ended without a terminal event".to_string(),
        ))
    }
}

pub struct RelayServiceBuilder {
    config: RelayConfig,
    adapters: Option<Vec<Arc<dyn ProviderAdapter>>>,
    retrieval_client: Option<Box<dyn RetrievalClient>>,
    analytics_sink: Option<Arc<dyn AnalyticsSink>>,
}

impl RelayServiceBuilder {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            adapters: None,
            retrieval_client: None,
            analytics_sink: None,
        }
    }

    /// Replace the HTTP adapters. The descriptor order still defines the
    /// attempt sequence.
    pub fn with_adapters(mut self, adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub fn with_retrieval_client(mut self, client: Box<dyn RetrievalClient>) -> Self {
        self.retrieval_client = Some(client);
        self
    }

    pub fn with_analytics_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<RelayService> {
        let adapters = match self.adapters {
            Some(adapters) => adapters,
            None => self
                .config
                .providers
                .iter()
                .cloned()
                .map(build_adapter)
                .collect::<Result<Vec<_>>>()?,
        };
        if adapters.is_empty() {
            return Err(Error::Configuration(
                "at least one provider adapter is required".to_string(),
            ));
        }

        let sink: Arc<dyn AnalyticsSink> = match self.analytics_sink {
            Some(sink) => sink,
            None => match &self.config.analytics {
                Some(analytics) => Arc::new(HttpAnalyticsSink::spawn(analytics)?),
                None => Arc::new(NoopAnalyticsSink),
            },
        };

        let names: Vec<String> = adapters
            .iter()
            .map(|a| a.descriptor().name.clone())
            .collect();
        let metrics = Arc::new(MetricsRecorder::new(&names, sink));

        let augmentor = match (self.retrieval_client, &self.config.retrieval) {
            (Some(client), Some(retrieval)) => {
                Some(ContextAugmentor::with_client(client, retrieval))
            }
            (None, Some(retrieval)) => Some(ContextAugmentor::new(retrieval)?),
            (Some(_), None) => {
                return Err(Error::Configuration(
                    "retrieval client given but no retrieval config".to_string(),
                ))
            }
            (None, None) => None,
        };

        Ok(RelayService {
            orchestrator: FallbackOrchestrator::new(
                adapters,
                metrics.clone(),
                self.config.attempt_timeout,
            ),
            augmentor,
            metrics,
            heartbeat_interval: self.config.heartbeat_interval,
            generation: self.config.generation,
        })
    }
}
