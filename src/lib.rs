//! Streaming LLM relay with provider fallback.
//!
//! The relay accepts one chat request, opens a streaming connection to the
//! primary provider, and forwards normalized events to the caller. Until the
//! first token has been forwarded, a retryable upstream failure moves the
//! request to the next configured provider; afterwards the active provider
//! is committed and its failure becomes the terminal error. Every stream
//! ends in exactly one terminal event.
//!
//! ```no_run
//! use llm_relay::{ChatRequest, RelayConfig, RelayService};
//!
//! # async fn run() -> llm_relay::Result<()> {
//! let config = RelayConfig::from_env()?;
//! let service = RelayService::builder(config).build()?;
//! let response = service.chat(ChatRequest::from_query("What is Rust?")).await?;
//! println!("{} ({})", response.output, response.provider);
//! # Ok(())
//! # }
//! ```

pub mod augment;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod relay;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::{
    AnalyticsConfig, GenerationParams, ProviderDescriptor, ProviderFamily, RelayConfig,
    RetrievalConfig, TimeoutConfig,
};
pub use error::{Error, ErrorCode, RelayError};
pub use metrics::{AnalyticsEvent, AnalyticsSink, MetricsRecorder, NoopAnalyticsSink};
pub use orchestrator::FallbackOrchestrator;
pub use provider::{AdapterStream, ProviderAdapter};
pub use relay::{CancelHandle, ControlledStream, RelayService, RelayServiceBuilder};
pub use session::StreamSession;
pub use types::events::{RelayEvent, Snippet};
pub use types::message::{ChatRequest, ChatResponse, Message, MessageRole};

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Owned, pinned, `Send` stream. Every streaming seam in the crate speaks
/// this type.
pub type BoxStream<'a, T> = std::pin::Pin<Box<dyn futures::Stream<Item = T> + Send + 'a>>;
