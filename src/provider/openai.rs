//! OpenAI-style adapter: SSE frames of `data: <json>` chunks with a literal
//! `[DONE]` marker ending the stream.

use crate::config::{GenerationParams, ProviderDescriptor};
use crate::error::{ErrorCode, RelayError};
use crate::provider::{classify_open_error, classify_response, AdapterStream, ProviderAdapter};
use crate::transport::HttpTransport;
use crate::types::events::RelayEvent;
use crate::types::message::{Message, MessageRole};
use crate::wire::FrameDecoder;
use crate::Result;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::VecDeque;

const STREAM_DONE_MARKER: &str = "[DONE]";

pub struct OpenAiAdapter {
    descriptor: ProviderDescriptor,
    transport: HttpTransport,
}

impl OpenAiAdapter {
    pub fn new(descriptor: ProviderDescriptor) -> Result<Self> {
        let transport = HttpTransport::new(&descriptor)?;
        Ok(Self {
            descriptor,
            transport,
        })
    }

    /// Splice the context block into the first system message, or prepend a
    /// synthetic one, so the provider sees it as instructions rather than
    /// user input.
    fn build_body(
        &self,
        messages: &[Message],
        context_block: Option<&str>,
        params: &GenerationParams,
    ) -> serde_json::Value {
        let mut sent: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);
        let mut injected = context_block.is_none();
        for m in messages {
            if !injected && m.role == MessageRole::System {
                sent.push(serde_json::json!({
                    "role": "system",
                    "content": format!("{}{}", context_block.unwrap_or(""), m.content),
                }));
                injected = true;
            } else {
                sent.push(serde_json::json!({ "role": m.role, "content": m.content }));
            }
        }
        if !injected {
            sent.insert(
                0,
                serde_json::json!({ "role": "system", "content": context_block.unwrap_or("") }),
            );
        }
        serde_json::json!({
            "model": params.model.as_deref().unwrap_or(&self.descriptor.model),
            "messages": sent,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": true,
        })
    }
}

struct DecodeState {
    bytes: crate::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    decoder: FrameDecoder,
    pending: VecDeque<std::result::Result<RelayEvent, RelayError>>,
    provider: String,
    model: String,
    eof: bool,
    finished: bool,
}

impl DecodeState {
    fn translate(&mut self, data: &str) {
        if self.finished {
            return;
        }
        if data.trim() == STREAM_DONE_MARKER {
            // Marker carries no usage data; synthesize the terminal event.
            self.pending
                .push_back(Ok(RelayEvent::done_without_usage(&self.provider, &self.model)));
            self.finished = true;
            return;
        }
        let value: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                self.pending.push_back(Err(RelayError::new(
                    ErrorCode::ParseError,
                    format!("{}: unrecognized stream payload: {}", self.provider, e),
                )));
                self.finished = true;
                return;
            }
        };
        // Role-only and keepalive chunks have no delta content; skip them.
        let delta = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str());
        if let Some(delta) = delta {
            if !delta.is_empty() {
                self.pending.push_back(Ok(RelayEvent::Token {
                    delta: delta.to_string(),
                    provider: self.provider.clone(),
                }));
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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

        let provider = self.descriptor.name.clone();
        let state = DecodeState {
            bytes: Box::pin(resp.bytes_stream()),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            provider: provider.clone(),
            model: self.descriptor.model.clone(),
            eof: false,
            finished: false,
        };

        Ok(Box::pin(stream::unfold(state, |mut st| async move {
            loop {
                if let Some(item) = st.pending.pop_front() {
                    return Some((item, st));
                }
                if st.finished && st.eof {
                    return None;
                }
                if st.eof {
                    return None;
                }
                match st.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let frames = st.decoder.push(&chunk);
                        for frame in frames {
                            let data = frame.data.clone();
                            st.translate(&data);
                        }
                    }
                    Some(Err(e)) => {
                        if !st.finished {
                            let err = RelayError::from_transport(&e, &st.provider);
                            st.pending.push_back(Err(err));
                        }
                        st.eof = true;
                        st.finished = true;
                    }
                    None => {
                        if let Some(frame) = st.decoder.finish() {
                            let data = frame.data.clone();
                            st.translate(&data);
                        }
                        if !st.finished {
                            // Stream end without marker still terminates.
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

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn adapter() -> OpenAiAdapter {
        let descriptor = ProviderDescriptor::new(
            "openai",
            Url::parse("https://api.openai.com/v1/chat/completions").unwrap(),
            "gpt-4o-mini",
            crate::config::ProviderFamily::OpenAiSse,
        );
        OpenAiAdapter::new(descriptor).unwrap()
    }

    #[test]
    fn context_block_lands_in_first_system_message() {
        let a = adapter();
        let body = a.build_body(
            &[Message::system("be terse"), Message::user("Hi")],
            Some("---\ncontext\n---\n"),
            &GenerationParams::default(),
        );
        let content = body["messages"][0]["content"].as_str().unwrap();
        assert!(content.starts_with("---\ncontext\n---\n"));
        assert!(content.ends_with("be terse"));
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn context_block_prepends_system_when_absent() {
        let a = adapter();
        let body = a.build_body(
            &[Message::user("Hi")],
            Some("CTX"),
            &GenerationParams::default(),
        );
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "CTX");
        assert_eq!(body["messages"][1]["content"], "Hi");
    }

    #[test]
    fn no_context_leaves_conversation_untouched() {
        let a = adapter();
        let body = a.build_body(&[Message::user("Hi")], None, &GenerationParams::default());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn translate_emits_tokens_and_done_marker() {
        let mut st = DecodeState {
            bytes: Box::pin(futures::stream::empty()),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            eof: false,
            finished: false,
        };
        st.translate(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#);
        assert!(st.pending.is_empty());
        st.translate(r#"{"choices":[{"delta":{"content":"Hello"}}]}"#);
        st.translate("[DONE]");
        assert_eq!(st.pending.len(), 2);
        assert!(matches!(
            st.pending.pop_front(),
            Some(Ok(RelayEvent::Token { .. }))
        ));
        assert!(matches!(
            st.pending.pop_front(),
            Some(Ok(RelayEvent::Done { .. }))
        ));
        assert!(st.finished);
    }

    #[test]
    fn translate_flags_unparseable_payload() {
        let mut st = DecodeState {
            bytes: Box::pin(futures::stream::empty()),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            eof: false,
            finished: false,
        };
        st.translate("not json at all");
        match st.pending.pop_front() {
            Some(Err(e)) => {
                assert_eq!(e.code, ErrorCode::ParseError);
                assert!(!e.retryable());
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
