use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use llm_relay::wire::{encode_event, parse_event, FrameDecoder};
use llm_relay::RelayEvent;

fn sample_wire(frames: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..frames {
        let event = RelayEvent::Token {
            delta: format!("token-{} ", i),
            provider: "openai".to_string(),
        };
        out.extend_from_slice(&encode_event(&event));
    }
    out.extend_from_slice(&encode_event(&RelayEvent::done_without_usage(
        "openai",
        "gpt-4o-mini",
    )));
    out
}

fn bench_decode(c: &mut Criterion) {
    let wire = sample_wire(512);
    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(wire.len() as u64));

    for chunk_size in [64usize, 512, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut decoder = FrameDecoder::new();
                    let mut events = 0usize;
                    for chunk in wire.chunks(chunk_size) {
                        for frame in decoder.push(chunk) {
                            if parse_event(&frame).is_some() {
                                events += 1;
                            }
                        }
                    }
                    black_box(events)
                })
            },
        );
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let event = RelayEvent::Token {
        delta: "a representative token delta".to_string(),
        provider: "openai".to_string(),
    };
    c.bench_function("frame_encode_token", |b| {
        b.iter(|| black_box(encode_event(black_box(&event))))
    });
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
