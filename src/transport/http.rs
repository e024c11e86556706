use crate::config::{ProviderDescriptor, TimeoutConfig};
use crate::Result;
use keyring::Entry;
use std::env;

/// Streaming-capable HTTP transport for one provider endpoint.
///
/// The client carries connect and overall deadlines from the descriptor, so
/// a provider stream that stalls past the overall deadline errors out with
/// a timeout instead of hanging.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    api_key: Option<String>,
    provider: String,
}

impl HttpTransport {
    pub fn new(descriptor: &ProviderDescriptor) -> Result<Self> {
        let api_key = descriptor
            .credential
            .clone()
            .or_else(|| Self::resolve_credential(&descriptor.name));

        let client = build_client(&descriptor.timeouts)?;

        Ok(Self {
            client,
            endpoint: descriptor.endpoint.clone(),
            api_key,
            provider: descriptor.name.clone(),
        })
    }

    fn resolve_credential(provider: &str) -> Option<String> {
        // 1. Keyring
        if let Ok(entry) = Entry::new("llm-relay", provider) {
            if let Ok(key) = entry.get_password() {
                return Some(key);
            }
        }

        // 2. Environment variable (PROVIDER_API_KEY)
        let env_var = format!("{}_API_KEY", provider.to_uppercase());
        env::var(env_var).ok()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// POST a vendor body and return the streaming response. The response
    /// body is consumed incrementally by the caller; dropping it releases
    /// the connection.
    pub async fn post_stream(
        &self,
        body: &serde_json::Value,
        request_id: &str,
    ) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .header("accept", "text/event-stream")
            .header("x-relay-request-id", request_id);

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        Ok(req.send().await?)
    }
}

/// Shared client construction used by the provider transport and the
/// retrieval/analytics collaborators.
pub fn build_client(timeouts: &TimeoutConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.overall)
        .pool_max_idle_per_host(
            env::var("RELAY_HTTP_POOL_MAX_IDLE_PER_HOST")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(32),
        )
        .build()?;
    Ok(client)
}
