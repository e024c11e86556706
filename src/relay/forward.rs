//! Event-to-wire forwarding with idle heartbeats.

use crate::types::events::RelayEvent;
use crate::wire::encode_event;
use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::time::Duration;

struct ForwardState {
    events: BoxStream<'static, RelayEvent>,
    interval: Duration,
}

/// Encode events as wire frames, inserting a heartbeat comment whenever the
/// upstream goes quiet for a full interval. Heartbeats are pure transport
/// padding; conformant decoders drop them, so the semantic event sequence
/// is unchanged.
pub fn forward_with_heartbeats(
    events: BoxStream<'static, RelayEvent>,
    interval: Duration,
) -> BoxStream<'static, Bytes> {
    let state = ForwardState { events, interval };
    Box::pin(stream::unfold(state, |mut st| async move {
        match tokio::time::timeout(st.interval, st.events.next()).await {
            Ok(Some(event)) => Some((encode_event(&event), st)),
            Ok(None) => None,
            Err(_) => Some((encode_event(&RelayEvent::Heartbeat), st)),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{parse_event, FrameDecoder};

    async fn frames(bytes: Vec<Bytes>) -> Vec<RelayEvent> {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in bytes {
            for frame in decoder.push(&chunk) {
                if let Some(event) = parse_event(&frame) {
                    events.push(event);
                }
            }
        }
        events
    }

    #[tokio::test]
    async fn quiet_stream_gets_heartbeats_that_decode_away() {
        let events = Box::pin(stream::unfold(0u32, |n| async move {
            match n {
                0 => Some((
                    RelayEvent::Token {
                        delta: "hi".into(),
                        provider: "openai".into(),
                    },
                    1,
                )),
                1 => {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Some((RelayEvent::done_without_usage("openai", "gpt-4o-mini"), 2))
                }
                _ => None,
            }
        }));
        let wire: Vec<Bytes> = forward_with_heartbeats(events, Duration::from_millis(10))
            .collect()
            .await;

        // At least one heartbeat frame was emitted during the quiet gap.
        assert!(wire
            .iter()
            .any(|b| b.as_ref() == b": heartbeat\n\n".as_ref()));

        // The decoded semantic sequence is unchanged.
        let decoded = frames(wire).await;
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].is_token());
        assert!(decoded[1].is_terminal());
    }

    #[tokio::test]
    async fn fast_stream_has_no_heartbeats() {
        let events = Box::pin(stream::iter(vec![
            RelayEvent::Token {
                delta: "a".into(),
                provider: "openai".into(),
            },
            RelayEvent::done_without_usage("openai", "gpt-4o-mini"),
        ]));
        let wire: Vec<Bytes> = forward_with_heartbeats(events, Duration::from_secs(5))
            .collect()
            .await;
        assert_eq!(wire.len(), 2);
        assert!(wire.iter().all(|b| !b.starts_with(b":")));
    }
}
