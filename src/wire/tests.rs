use super::*;
use crate::types::events::RelayEvent;

fn decode_all<T: AsRef<[u8]>>(chunks: &[T]) -> Vec<Frame> {
    let mut dec = FrameDecoder::new();
    let mut frames = Vec::new();
    for c in chunks {
        frames.extend(dec.push(c.as_ref()));
    }
    if let Some(f) = dec.finish() {
        frames.push(f);
    }
    frames
}

#[test]
fn decodes_unsplit_stream() {
    let frames = decode_all(&[b"event: llm.token\ndata: {\"delta\":\"Hi\"}\n\nevent: llm.done\ndata: {}\n\n"]);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].event.as_deref(), Some("llm.token"));
    assert_eq!(frames[0].data, "{\"delta\":\"Hi\"}");
    assert_eq!(frames[1].event.as_deref(), Some("llm.done"));
}

#[test]
fn chunk_boundary_invariance() {
    let stream = b"event: llm.token\ndata: {\"delta\":\"He\"}\n\n: keepalive\n\nevent: llm.token\ndata: {\"delta\":\"llo \\u00e9t\\u00e9\"}\n\nevent: llm.done\ndata: {\"usage\":{}}\n\n";
    let reference = decode_all(&[stream.as_slice()]);
    assert_eq!(reference.len(), 3);

    // Every split point, including mid-line, mid-field and exactly on the
    // delimiter, must reconstruct the identical frame sequence.
    for split in 1..stream.len() {
        let (a, b) = stream.split_at(split);
        assert_eq!(decode_all(&[a, b]), reference, "split at {}", split);
    }

    // Byte-at-a-time is the degenerate case of the same property.
    let singles: Vec<&[u8]> = stream.chunks(1).collect();
    assert_eq!(decode_all(&singles), reference);
}

#[test]
fn multibyte_utf8_split_across_chunks() {
    let stream = "data: été\n\n".as_bytes();
    // Split inside the first 'é' (two-byte sequence).
    let (a, b) = stream.split_at(7);
    let frames = decode_all(&[a, b]);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, "été");
}

#[test]
fn comment_lines_are_dropped() {
    let frames = decode_all(&[b": heartbeat\n\nevent: llm.token\ndata: {}\n: inline comment\n\n"]);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event.as_deref(), Some("llm.token"));
}

#[test]
fn multiple_data_lines_join_with_newline() {
    let frames = decode_all(&[b"data: line one\ndata: line two\n\n"]);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, "line one\nline two");
}

#[test]
fn trailing_partial_frame_flushes_on_finish() {
    let mut dec = FrameDecoder::new();
    assert!(dec.push(b"data: tail-without-terminator").is_empty());
    assert!(dec.pending_bytes() > 0);
    let frame = dec.finish().expect("remainder should flush");
    assert_eq!(frame.data, "tail-without-terminator");
}

#[test]
fn line_decoder_splits_ndjson() {
    let mut dec = LineDecoder::new();
    let mut lines = dec.push(b"{\"a\":1}\n\n{\"b\"");
    lines.extend(dec.push(b":2}\n"));
    if let Some(rest) = dec.finish() {
        lines.push(rest);
    }
    assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
}

#[test]
fn encode_token_frame_shape() {
    let ev = RelayEvent::Token {
        delta: "Hello ".into(),
        provider: "openai".into(),
    };
    let bytes = encode_event(&ev);
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(text.starts_with("event: llm.token\ndata: "));
    assert!(text.ends_with("\n\n"));
    assert!(text.contains("\"delta\":\"Hello \""));
}

#[test]
fn heartbeat_encodes_as_comment_and_is_filtered_by_decoder() {
    let bytes = encode_event(&RelayEvent::Heartbeat);
    assert_eq!(&bytes[..], b": heartbeat\n\n");
    let mut dec = FrameDecoder::new();
    assert!(dec.push(&bytes).is_empty());
}

#[test]
fn encode_parse_roundtrip_for_terminal_events() {
    let done = RelayEvent::Done {
        provider: "hf".into(),
        model: "mistral-7b".into(),
        usage: [("completion_tokens".to_string(), 12.0)].into_iter().collect(),
        fallback_used: true,
        provenance: Some(vec![Snippet {
            text: "snippet".into(),
            source_url: None,
            score: 0.5,
            doc_id: Some("d1".into()),
            chunk_id: Some(0),
        }]),
    };
    let mut dec = FrameDecoder::new();
    let frames = dec.push(&encode_event(&done));
    assert_eq!(frames.len(), 1);
    assert_eq!(parse_event(&frames[0]), Some(done));

    let err = RelayEvent::Error {
        code: ErrorCode::AllProvidersFailed,
        message: "all configured providers failed".into(),
        details: None,
        retryable: false,
    };
    let frames = dec.push(&encode_event(&err));
    assert_eq!(parse_event(&frames[0]), Some(err));
}
