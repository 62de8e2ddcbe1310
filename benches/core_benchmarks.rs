//! # ttcache Benchmarks (Core)
//!
//! Measures the hot paths of the tag-tree cache against the in-memory
//! backend:
//!
//! * `remember` hit: one value fetch plus one fingerprint multi-get
//! * `remember` miss with bypass: fingerprint fetch and callback, no write
//! * nested trees: an outer hit short-circuits the whole subtree
//! * `clear_tags`: one fingerprint rotation
//!
//! The in-memory backend keeps numbers free of network noise; with a remote
//! store the round-trip counts dominate, and those are asserted by the
//! integration tests instead.
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench core_benchmarks
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::executor::block_on;
use std::sync::Arc;
use std::time::Duration;
use ttcache::{Computed, MemoryBackend, Tag, TtCache};

const PAYLOAD_SIZE: usize = 1024;

const MEASUREMENT_TIME_MS: u64 = 2000;
const WARMUP_TIME_MS: u64 = 500;

fn configure(c: &mut Criterion) -> criterion::BenchmarkGroup<'_, criterion::measurement::WallTime> {
    let mut group = c.benchmark_group("ttcache_core");
    group.measurement_time(Duration::from_millis(MEASUREMENT_TIME_MS));
    group.warm_up_time(Duration::from_millis(WARMUP_TIME_MS));
    group
}

fn payload() -> Vec<u8> {
    (0..PAYLOAD_SIZE).map(|i| (i % 256) as u8).collect()
}

fn bench_core(c: &mut Criterion) {
    let mut group = configure(c);

    let cache = TtCache::new(Arc::new(MemoryBackend::new()));
    block_on(async {
        cache
            .remember("warm", 0, &[Tag::plain("bench")], || async {
                Ok(Computed::Value(payload()))
            })
            .await
            .unwrap();
    });

    group.bench_function("remember_hit_1k", |b| {
        b.iter(|| {
            let hit = block_on(cache.remember("warm", 0, &[], || async {
                Ok(Computed::Value(Vec::<u8>::new()))
            }))
            .unwrap();
            black_box(hit.into_value());
        })
    });

    group.bench_function("remember_miss_bypass_1k", |b| {
        b.iter(|| {
            let miss = block_on(cache.remember("cold", 0, &[Tag::plain("bench")], || async {
                Ok(Computed::Bypass(payload()))
            }))
            .unwrap();
            black_box(miss.into_value());
        })
    });

    let nested = TtCache::new(Arc::new(MemoryBackend::new()));
    block_on(async {
        nested
            .remember("outer", 0, &[], || async {
                let first = nested
                    .remember("inner:1", 0, &[Tag::plain("sub:1")], || async {
                        Ok(Computed::Value("left".to_string()))
                    })
                    .await?;
                let second = nested
                    .remember("inner:2", 0, &[Tag::plain("sub:2")], || async {
                        Ok(Computed::Value("right".to_string()))
                    })
                    .await?;
                Ok(Computed::Value(format!("{}|{}", first.value(), second.value())))
            })
            .await
            .unwrap();
    });

    group.bench_function("nested_tree_hit", |b| {
        b.iter(|| {
            let hit = block_on(nested.remember("outer", 0, &[], || async {
                Ok(Computed::Value(String::new()))
            }))
            .unwrap();
            black_box(hit.into_value());
        })
    });

    group.bench_function("clear_tags_single", |b| {
        b.iter(|| {
            block_on(cache.clear_tags(&[Tag::plain("bench")]));
        })
    });

    group.finish();
}

criterion_group!(benches, bench_core);
criterion_main!(benches);
