//! Text-generation-inference adapter: newline-delimited JSON objects, each
//! carrying `token.text` increments and a final object with
//! `generated_text` set.

use crate::config::{GenerationParams, ProviderDescriptor};
use crate::error::RelayError;
use crate::provider::{classify_open_error, classify_response, AdapterStream, ProviderAdapter};
use crate::transport::HttpTransport;
use crate::types::events::RelayEvent;
use crate::types::message::{Message, MessageRole};
use crate::wire::LineDecoder;
use crate::Result;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::VecDeque;

pub struct TextGenAdapter {
    descriptor: ProviderDescriptor,
    transport: HttpTransport,
}

impl TextGenAdapter {
    pub fn new(descriptor: ProviderDescriptor) -> Result<Self> {
        let transport = HttpTransport::new(&descriptor)?;
        Ok(Self {
            descriptor,
            transport,
        })
    }

    /// Flatten the conversation into a single prompt. The endpoint takes raw
    /// text, so roles become labeled lines and the prompt ends with an open
    /// assistant turn for the model to complete.
    fn build_prompt(messages: &[Message], context_block: Option<&str>) -> String {
        let mut prompt = String::new();
        if let Some(block) = context_block {
            prompt.push_str(block);
        }
        for m in messages {
            let label = match m.role {
                MessageRole::System => "System",
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            prompt.push_str(label);
            prompt.push_str(": ");
            prompt.push_str(&m.content);
            prompt.push('\n');
        }
        prompt.push_str("Assistant:");
        prompt
    }

    fn build_body(
        &self,
        messages: &[Message],
        context_block: Option<&str>,
        params: &GenerationParams,
    ) -> serde_json::Value {
        serde_json::json!({
            "inputs": Self::build_prompt(messages, context_block),
            "parameters": {
                "temperature": params.temperature,
                "max_new_tokens": params.max_tokens,
                "return_full_text": false,
            },
            "stream": true,
        })
    }
}

/// The per-increment text of one NDJSON object, when it has one. Objects
/// that do not parse or carry no text are skipped, matching the endpoint's
/// habit of interleaving metadata objects with token objects.
fn token_text(value: &serde_json::Value) -> Option<&str> {
    value
        .get("token")
        .and_then(|t| t.get("text"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
}

/// A non-null `generated_text` marks the stream's final object.
fn final_text(value: &serde_json::Value) -> Option<Option<&str>> {
    match value.get("generated_text") {
        Some(g) if !g.is_null() => Some(g.as_str().filter(|t| !t.is_empty())),
        _ => None,
    }
}

struct DecodeState {
    bytes: crate::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    decoder: LineDecoder,
    pending: VecDeque<std::result::Result<RelayEvent, RelayError>>,
    provider: String,
    model: String,
    eof: bool,
    finished: bool,
    emitted: bool,
}

impl DecodeState {
    fn push_token(&mut self, text: &str) {
        self.emitted = true;
        self.pending.push_back(Ok(RelayEvent::Token {
            delta: text.to_string(),
            provider: self.provider.clone(),
        }));
    }

    fn translate(&mut self, line: &str) {
        if self.finished || line.trim().is_empty() {
            return;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return,
        };
        if let Some(aggregate) = final_text(&value) {
            // The final object repeats the full text; re-emitting it after
            // streamed increments would duplicate them. Servers that only
            // send the aggregate get it as the single token.
            if !self.emitted {
                if let Some(text) = aggregate {
                    self.push_token(text);
                }
            }
            self.pending
                .push_back(Ok(RelayEvent::done_without_usage(&self.provider, &self.model)));
            self.finished = true;
            return;
        }
        if let Some(text) = token_text(&value) {
            let text = text.to_string();
            self.push_token(&text);
        }
    }
}

#[async_trait]
impl ProviderAdapter for TextGenAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn open_stream(
        &self,
        messages: &[Message],
        context_block: Option<&str>,
        params: &GenerationParams,
        request_id: &str,
    ) -> std::result::Result<AdapterStream, RelayError> {
        let body = self.build_body(messages, context_block, params);
        let resp = self
            .transport
            .post_stream(&body, request_id)
            .await
            .map_err(|e| classify_open_error(e, &self.descriptor.name))?;
        let resp = classify_response(resp, &self.descriptor.name).await?;

        let state = DecodeState {
            bytes: Box::pin(resp.bytes_stream()),
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            provider: self.descriptor.name.clone(),
            model: self.descriptor.model.clone(),
            eof: false,
            finished: false,
            emitted: false,
        };

        Ok(Box::pin(stream::unfold(state, |mut st| async move {
            loop {
                if let Some(item) = st.pending.pop_front() {
                    return Some((item, st));
                }
                if st.eof {
                    return None;
                }
                match st.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for line in st.decoder.push(&chunk) {
                            st.translate(&line);
                        }
                    }
                    Some(Err(e)) => {
                        if !st.finished {
                            st.pending
                                .push_back(Err(RelayError::from_transport(&e, &st.provider)));
                        }
                        st.eof = true;
                        st.finished = true;
                    }
                    None => {
                        if let Some(line) = st.decoder.finish() {
                            st.translate(&line);
                        }
                        if !st.finished {
                            st.pending.push_back(Ok(RelayEvent::done_without_usage(
                                &st.provider,
                                &st.model,
                            )));
                            st.finished = true;
                        }
                        st.eof = true;
                    }
                }
            }
        })))
    }
}
