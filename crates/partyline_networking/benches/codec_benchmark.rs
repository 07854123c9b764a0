//! # Push Hot Path Benchmark
//!
//! Every pushed event goes through frame decoding and payload normalization.
//!
//! Run with: `cargo bench --package partyline_networking`

// Benchmarks don't need strict docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use partyline_networking::protocol::{decode, encode_subscribe};
use partyline_shared::{parse_subscription_payload, Dialect, EventFilter, EventSource};
use serde_json::{json, Value};

fn next_frame(events: usize) -> String {
    let nodes: Vec<Value> = (0..events)
        .map(|i| {
            json!({
                "sender": "0x5e1de7",
                "type": "0xabc::party::LotteryExecutedEvent",
                "timestamp": "1700000000000",
                "json": {"activity_id": format!("0x{i:x}"), "winner": "0x1", "prize": "100"}
            })
        })
        .collect();
    json!({"type": "next", "id": "sub-1", "payload": {"data": {"events": nodes}}}).to_string()
}

/// Benchmark: frame decoding.
fn bench_decode(c: &mut Criterion) {
    let frame = next_frame(1);

    c.bench_function("decode_next_frame", |b| {
        b.iter(|| black_box(decode(Dialect::GraphqlTransportWs, black_box(&frame))));
    });

    c.bench_function("decode_garbage", |b| {
        b.iter(|| black_box(decode(Dialect::GraphqlTransportWs, black_box("{not json"))));
    });
}

/// Benchmark: decode + normalize + filter, by batch size.
fn bench_push_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_pipeline");
    let filter = EventFilter::new("0xabc", "party").with_struct_names(["LotteryExecuted"]);

    for size in [1, 10, 50] {
        let frame = next_frame(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| {
                let partyline_networking::Frame::Data { payload, .. } =
                    decode(Dialect::GraphqlTransportWs, frame)
                else {
                    return 0;
                };
                parse_subscription_payload(&payload, EventSource::Push)
                    .iter()
                    .filter(|event| filter.matches(event))
                    .count()
            });
        });
    }

    group.finish();
}

/// Benchmark: subscribe frame encoding.
fn bench_encode(c: &mut Criterion) {
    let variables = json!({"filter": {"MoveEventModule": {"package": "0xabc", "module": "party"}}});

    c.bench_function("encode_subscribe", |b| {
        b.iter(|| {
            black_box(encode_subscribe(
                Dialect::GraphqlTransportWs,
                "sub-1",
                "subscription { events { type } }",
                black_box(&variables),
            ))
        });
    });
}

criterion_group!(benches, bench_decode, bench_push_pipeline, bench_encode);
criterion_main!(benches);
