//! Benchmarks for the streaming path.
//!
//! Run with: cargo bench
//! Run specific: cargo bench -- reduce
//!
//! Performance budgets (targets):
//! - `sse_parsing/parse/1000`: <1ms
//! - `reduce/lines/1000`: <2ms

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::fmt::Write as _;
use std::hint::black_box;
use std::time::Duration;
use toolcall_harness::sse::SseParser;
use toolcall_harness::stream::{StreamAggregator, reduce_lines};

// ============================================================================
// Test Data Builders
// ============================================================================

/// A tool call whose arguments arrive a few characters per chunk.
fn build_tool_call_stream(delta_count: usize) -> String {
    let mut s = String::new();
    s.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"calculate\",\"arguments\":\"\"}}]}}]}\n\n");
    for i in 0..delta_count {
        let _ = write!(
            s,
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"tool_calls\":[{{\"index\":0,\"function\":{{\"arguments\":\"{i}+\"}}}}]}}}}]}}\n\n"
        );
    }
    s.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n");
    s.push_str("data: [DONE]\n\n");
    s
}

fn chunk_str(input: &str, chunk_size: usize) -> Vec<String> {
    input
        .as_bytes()
        .chunks(chunk_size)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

// ============================================================================
// SSE Parsing
// ============================================================================

fn bench_sse_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("sse_parsing");

    for event_count in [10, 100, 1000] {
        let data = build_tool_call_stream(event_count);
        group.throughput(Throughput::Elements(event_count as u64));
        group.bench_with_input(BenchmarkId::new("parse", event_count), &data, |b, data| {
            b.iter(|| {
                let mut parser = SseParser::new();
                let events = parser.feed(black_box(data));
                black_box(events)
            });
        });
    }

    group.finish();
}

// ============================================================================
// Reduction
// ============================================================================

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");

    for delta_count in [10, 100, 1000] {
        let data = build_tool_call_stream(delta_count);
        group.throughput(Throughput::Elements(delta_count as u64));
        group.bench_with_input(BenchmarkId::new("lines", delta_count), &data, |b, data| {
            b.iter(|| {
                let state = reduce_lines(black_box(data).lines()).expect("reduce");
                black_box(state)
            });
        });
    }

    group.finish();
}

fn bench_chunked_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_stream");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(5));

    let delta_count = 1000;
    let data = build_tool_call_stream(delta_count);

    // ASCII input, so byte chunking never splits a character.
    for chunk_size in [64usize, 1024, 4096] {
        let chunks = chunk_str(&data, chunk_size);
        group.throughput(Throughput::Elements(delta_count as u64));
        group.bench_function(BenchmarkId::new("aggregate", chunk_size), |b| {
            b.iter(|| {
                let mut parser = SseParser::new();
                let mut aggregator = StreamAggregator::new();
                for chunk in &chunks {
                    for event in parser.feed(chunk) {
                        aggregator.push_data(&event.data).expect("chunk");
                    }
                }
                black_box(aggregator.finish(Duration::ZERO))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sse_parsing, bench_reduce, bench_chunked_stream);
criterion_main!(benches);
