use criterion::{black_box, BatchSize, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};
use time::macros::datetime;
use time::Duration;

use historian::data::SensorData;
use historian::{CacheEntry, HistorianCache, HistorianPlayer, PlayerConfig, Record};

fn sample_entries(count: usize) -> Vec<CacheEntry> {
    let base = datetime!(2026-01-01 00:00 UTC);
    (0..count)
        .map(|i| {
            let ts = base + Duration::milliseconds(i as i64 * 250);
            CacheEntry::new(SensorData::new("temp", i as f32).on_device("bench").at(ts))
        })
        .collect()
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_add");
    for &count in &[1_000_usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let cache = HistorianCache::new("bench").expect("cache");
                    (cache, sample_entries(count))
                },
                |(mut cache, entries)| {
                    for entry in entries {
                        cache.add(black_box(entry));
                    }
                    black_box(cache.approx_memory_usage());
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_replay");
    for &count in &[1_000_usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let mut cache = HistorianCache::new("bench").expect("cache");
                    cache.add_many(sample_entries(count));
                    cache
                },
                |mut cache| {
                    while let Some(entry) = cache.next() {
                        black_box(entry.timestamp());
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_trigger(c: &mut Criterion) {
    c.bench_function("player_trigger_next_event", |b| {
        b.iter_batched(
            || {
                let player = HistorianPlayer::new("bench", PlayerConfig::default()).expect("player");
                player.add_entries(sample_entries(1_000));
                player
            },
            |player| {
                for _ in 0..1_000 {
                    black_box(player.trigger_next_event());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_add, bench_replay, bench_trigger);
criterion_main!(benches);
