//! Hot-path benchmarks: the hasher and a cold/sticky selection.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nity_common::hash;
use nity_core::pipeline::{select, ConnectRequest};
use nity_core::bench_support::{BenchConntrack, BenchCounters, BenchStore};

fn bench_mix(c: &mut Criterion) {
    c.bench_function("mix", |b| {
        b.iter(|| hash::mix(black_box(0xC0FF_EE11_2233_4455)))
    });
}

fn bench_flow_key(c: &mut Criterion) {
    c.bench_function("flow_key", |b| {
        b.iter(|| {
            hash::flow_key(
                black_box(0xC0A8_0101),
                black_box(54321),
                black_box(0x0800_000A),
                black_box(80u16.to_be()),
                black_box(6),
            )
        })
    });
}

fn bench_cold_select(c: &mut Criterion) {
    let store = BenchStore::populated(10_000);
    let conntrack = BenchConntrack::default();
    let counters = BenchCounters::default();
    let req = ConnectRequest {
        dst_ip_be: 0x0800_000A,
        dst_port_be: 80u16.to_be(),
        proto: 6,
        src_ip_be: 0xC0A8_0101,
        src_port_host: 54321,
        now_ns: 1_000,
    };

    c.bench_function("select_cold", |b| {
        b.iter(|| black_box(select(&store, &conntrack, &counters, req)))
    });
}

fn bench_sticky_select(c: &mut Criterion) {
    let store = BenchStore::populated(10_000);
    let conntrack = BenchConntrack::default();
    let counters = BenchCounters::default();
    let req = ConnectRequest {
        dst_ip_be: 0x0800_000A,
        dst_port_be: 80u16.to_be(),
        proto: 6,
        src_ip_be: 0xC0A8_0101,
        src_port_host: 54321,
        now_ns: 1_000,
    };
    // Warm the conntrack entry once, then benchmark only the hit path.
    let _ = select(&store, &conntrack, &counters, req);

    c.bench_function("select_sticky", |b| {
        b.iter(|| black_box(select(&store, &conntrack, &counters, req)))
    });
}

criterion_group!(benches, bench_mix, bench_flow_key, bench_cold_select, bench_sticky_select);
criterion_main!(benches);
