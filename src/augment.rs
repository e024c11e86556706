//! Retrieval-augmented context.
//!
//! Before the first provider attempt the augmentor may fetch supporting
//! snippets and fold them into a context block. Retrieval is strictly
//! best-effort: any failure is logged and the request proceeds without
//! context. The fetched snippets are kept on the session so the terminal
//! event can carry provenance.

use crate::config::RetrievalConfig;
use crate::transport::http::build_client;
use crate::types::events::Snippet;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>>;
}

/// Talks to the retrieval sidecar over HTTP.
pub struct HttpRetrievalClient {
    client: reqwest::Client,
    endpoint: url::Url,
}

#[derive(Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    results: Vec<Snippet>,
}

impl HttpRetrievalClient {
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(&config.timeouts)?,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>> {
        let body = serde_json::json!({ "q": query, "top_k": top_k });
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: RetrieveResponse = resp.json().await?;
        Ok(parsed.results)
    }
}

pub struct ContextAugmentor {
    client: Box<dyn RetrievalClient>,
    top_k: usize,
    auto_length_threshold: usize,
}

impl ContextAugmentor {
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        Ok(Self {
            client: Box::new(HttpRetrievalClient::new(config)?),
            top_k: config.top_k,
            auto_length_threshold: config.auto_length_threshold,
        })
    }

    pub fn with_client(client: Box<dyn RetrievalClient>, config: &RetrievalConfig) -> Self {
        Self {
            client,
            top_k: config.top_k,
            auto_length_threshold: config.auto_length_threshold,
        }
    }

    /// An explicit caller flag wins; otherwise long queries opt in.
    pub fn should_retrieve(&self, query: &str, use_rag: Option<bool>) -> bool {
        match use_rag {
            Some(flag) => flag,
            None => query.chars().count() >= self.auto_length_threshold,
        }
    }

    /// Fetch snippets for a query. Failures degrade to no context.
    pub async fn augment(&self, query: &str) -> Vec<Snippet> {
        match self.client.retrieve(query, self.top_k).await {
            Ok(snippets) => {
                tracing::debug!(count = snippets.len(), "retrieval returned snippets");
                snippets
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }
}

/// Render snippets as the block spliced ahead of the conversation. Marked
/// read-only so the model treats it as grounding, not instructions to
/// override.
pub fn context_block(snippets: &[Snippet]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }
    let mut block = String::from("---\nContext snippets (read-only):\n");
    for s in snippets {
        match &s.source_url {
            Some(url) => {
                block.push_str("[source:");
                block.push_str(url);
                block.push_str("] ");
            }
            None => block.push_str("[source:unknown] "),
        }
        block.push_str(&s.text);
        block.push('\n');
    }
    block.push_str("---\n");
    Some(block)
}
