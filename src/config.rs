//! Relay configuration: provider descriptors, timeouts, collaborator
//! endpoints. All knobs have env-overridable defaults; nothing here is
//! global state — a `RelayConfig` is built once and handed to the service.

use crate::error::Error;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

/// Which upstream streaming shape a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    /// `data: <json>` SSE frames with a literal `[DONE]` terminal marker.
    OpenAiSse,
    /// Newline-delimited JSON objects; no `event:`/`data:` structure.
    TextGenNdjson,
}

/// Outbound call deadlines. `overall` bounds the whole request including the
/// streaming body, so a stalled provider surfaces as a timeout rather than
/// an indefinite hang.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub connect: Duration,
    pub overall: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(env_u64("RELAY_CONNECT_TIMEOUT_MS", 5_000)),
            overall: Duration::from_millis(env_u64("RELAY_OVERALL_TIMEOUT_MS", 35_000)),
        }
    }
}

/// One upstream provider. The ordered descriptor list defines the attempt
/// sequence; the first entry is primary.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    pub endpoint: Url,
    /// Explicit credential. When absent the transport resolves one from the
    /// keyring, then from `<NAME>_API_KEY`.
    pub credential: Option<String>,
    pub model: String,
    pub family: ProviderFamily,
    pub is_primary: bool,
    pub timeouts: TimeoutConfig,
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<String>,
        endpoint: Url,
        model: impl Into<String>,
        family: ProviderFamily,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint,
            credential: None,
            model: model.into(),
            family,
            is_primary: false,
            timeouts: TimeoutConfig::default(),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Retrieval collaborator settings.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub endpoint: Url,
    pub top_k: usize,
    /// Queries at least this long trigger retrieval when the caller did not
    /// pass an explicit `use_rag` flag.
    pub auto_length_threshold: usize,
    pub timeouts: TimeoutConfig,
}

impl RetrievalConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            top_k: 3,
            auto_length_threshold: env_u64("RELAY_RAG_AUTO_LENGTH_THRESHOLD", 120) as usize,
            timeouts: TimeoutConfig {
                connect: Duration::from_secs(5),
                overall: Duration::from_secs(15),
            },
        }
    }
}

/// Analytics collaborator settings.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub endpoint: Url,
    /// Bounded background queue; records are dropped when it is full.
    pub queue_capacity: usize,
}

impl AnalyticsConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            queue_capacity: 256,
        }
    }
}

/// Generation parameters forwarded to providers. A per-request `model`
/// overrides the descriptor's default where the vendor body carries one.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub model: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            model: None,
        }
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub providers: Vec<ProviderDescriptor>,
    pub heartbeat_interval: Duration,
    /// Bound on awaiting the first event of an attempt. Exceeding it
    /// classifies as `UPSTREAM_TIMEOUT`.
    pub attempt_timeout: Option<Duration>,
    pub retrieval: Option<RetrievalConfig>,
    pub analytics: Option<AnalyticsConfig>,
    pub generation: GenerationParams,
}

impl RelayConfig {
    pub fn new(mut providers: Vec<ProviderDescriptor>) -> Result<Self> {
        if providers.is_empty() {
            return Err(Error::Configuration(
                "at least one provider is required".to_string(),
            ));
        }
        for (i, p) in providers.iter_mut().enumerate() {
            p.is_primary = i == 0;
        }
        Ok(Self {
            providers,
            heartbeat_interval: Duration::from_millis(env_u64(
                "RELAY_HEARTBEAT_INTERVAL_MS",
                15_000,
            )),
            attempt_timeout: Some(Duration::from_millis(env_u64(
                "RELAY_ATTEMPT_TIMEOUT_MS",
                30_000,
            ))),
            retrieval: None,
            analytics: None,
            generation: GenerationParams::default(),
        })
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Build the conventional two-provider setup from the environment:
    /// an OpenAI-style primary and a text-generation fallback, plus optional
    /// retrieval/analytics collaborators when their URLs are set.
    pub fn from_env() -> Result<Self> {
        let mut providers = Vec::new();

        let openai_base =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_endpoint = parse_url(&format!(
            "{}/v1/chat/completions",
            openai_base.trim_end_matches('/')
        ))?;
        let openai_model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        providers.push(ProviderDescriptor::new(
            "openai",
            openai_endpoint,
            openai_model,
            ProviderFamily::OpenAiSse,
        ));

        if let Ok(base) = env::var("TEXTGEN_BASE_URL") {
            let endpoint = parse_url(&format!("{}/generate_stream", base.trim_end_matches('/')))?;
            let model = env::var("TEXTGEN_MODEL")
                .unwrap_or_else(|_| "mistralai/Mistral-7B-Instruct-v0.3".to_string());
            providers.push(ProviderDescriptor::new(
                "textgen",
                endpoint,
                model,
                ProviderFamily::TextGenNdjson,
            ));
        }

        let mut config = Self::new(providers)?;
        if let Ok(rag) = env::var("RELAY_RAG_URL") {
            let endpoint = parse_url(&format!("{}/v1/retrieve", rag.trim_end_matches('/')))?;
            config = config.with_retrieval(RetrievalConfig::new(endpoint));
        }
        if let Ok(analytics) = env::var("RELAY_ANALYTICS_URL") {
            let endpoint = parse_url(&format!("{}/v1/ingest", analytics.trim_end_matches('/')))?;
            config = config.with_analytics(AnalyticsConfig::new(endpoint));
        }
        Ok(config)
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Configuration(format!("invalid URL {}: {}", raw, e)))
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}
