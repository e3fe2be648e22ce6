//! # Component Router Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Lookup id allocation with a crowded range | < 10µs |
//! | Request frame encoding | < 5µs |
//! | Directory reply parsing | < 5µs |

use component_router::adapters::PlaintextCipher;
use component_router::channel::wire::{decode_body, encode_request};
use component_router::domain::{DirectoryReply, LookupTable, PendingRequest};
use component_router::test_utils::{address_reply, RecordingCallback};
use component_router::RequestParams;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::time::Duration;

fn bench_lookup_ids(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup-ids");

    for outstanding in [0usize, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(outstanding),
            &outstanding,
            |b, &outstanding| {
                let mut table = LookupTable::new(-5000, 5000);
                for i in 0..outstanding {
                    table.begin(&format!("component-{i}"));
                }
                b.iter(|| {
                    let id = table.begin("bench").expect("free id");
                    black_box(table.complete(id));
                });
            },
        );
    }
    group.finish();
}

fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire");
    let request = PendingRequest {
        component: "billing".into(),
        rpc: "billing.charge".into(),
        request_id: 42,
        timeout: Duration::from_secs(5),
        params: Some(
            RequestParams::new()
                .with("accountId", "A-1001")
                .with("amount", 125)
                .with("currency", "EUR"),
        ),
        callback: RecordingCallback::shared(),
    };
    group.bench_function("encode_request", |b| {
        b.iter(|| encode_request(black_box(&request), false, &PlaintextCipher).expect("encode"))
    });

    let frame = json!({"reqid": 42, "response": json!({"status": 200, "balance": 10}).to_string()});
    group.bench_function("decode_body", |b| {
        b.iter(|| decode_body(black_box(frame.clone()), &PlaintextCipher).expect("decode"))
    });

    let reply = address_reply("10.0.0.5", 9000);
    group.bench_function("directory_reply", |b| {
        b.iter(|| DirectoryReply::parse(black_box(&reply)).expect("parse"))
    });
    group.finish();
}

criterion_group!(benches, bench_lookup_ids, bench_wire);
criterion_main!(benches);
