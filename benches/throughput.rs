//! Throughput benchmarks for bulk operations.
//!
//! Run with: `cargo bench --bench throughput`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chrono::{Duration, TimeZone, Utc};
use rand::Rng;
use std::path::Path;

use history::codec::{self, CacheHeader};
use indicators::{Atr, Chain, ChandelierExit, Ema, Hlc, IndicatorSeries, Sma};
use market_core::{Bar, DataSeries, ItemKind, MarketSeries, SeriesKey, TimeFrame};

/// Generate a random walk of hourly bars.
fn generate_bars(rng: &mut impl Rng, count: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut price = 100.0_f64;
    let mut bars = Vec::with_capacity(count);

    for i in 0..count {
        let open = price;
        let close = (open * (1.0 + rng.gen_range(-0.01..0.01))).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.005));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.005));
        bars.push(Bar::new(
            start + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            rng.gen_range(10.0..1000.0),
        ));
        price = close;
    }

    bars
}

/// Benchmark indicator series updates over a batch of bars.
fn bench_indicator_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicator_updates");
    let mut rng = rand::thread_rng();

    for bar_count in [1_000, 10_000, 100_000].iter() {
        let bars = generate_bars(&mut rng, *bar_count);

        group.throughput(Throughput::Elements(*bar_count as u64));
        group.bench_with_input(BenchmarkId::new("ema", bar_count), &bars, |b, bars| {
            b.iter(|| {
                let mut ema = IndicatorSeries::new(Ema::new(26));
                for bar in bars {
                    ema.update(&bar.close);
                }
                black_box(ema.current())
            })
        });
        group.bench_with_input(BenchmarkId::new("chandelier", bar_count), &bars, |b, bars| {
            b.iter(|| {
                let mut chandelier = IndicatorSeries::new(ChandelierExit::new(22, 3.0));
                for bar in bars {
                    chandelier.update(&Hlc::from(bar));
                }
                black_box(chandelier.current())
            })
        });
        group.bench_with_input(BenchmarkId::new("sma_of_atr", bar_count), &bars, |b, bars| {
            b.iter(|| {
                let mut chain = IndicatorSeries::new(Chain::new(Atr::new(14), Sma::new(20)));
                for bar in bars {
                    chain.update(&Hlc::from(bar));
                }
                black_box(chain.current())
            })
        });
    }

    group.finish();
}

/// Benchmark appending into bounded and unbounded windows.
fn bench_window_appends(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_appends");
    let bars = generate_bars(&mut rand::thread_rng(), 100_000);

    group.throughput(Throughput::Elements(bars.len() as u64));
    group.bench_function("unbounded", |b| {
        b.iter(|| {
            let mut window = DataSeries::new();
            for bar in &bars {
                window.add(*bar);
            }
            black_box(window.count())
        })
    });
    group.bench_function("bounded_256", |b| {
        b.iter(|| {
            let mut window = DataSeries::with_capacity(256);
            for bar in &bars {
                window.add(*bar);
            }
            black_box(window.count())
        })
    });

    group.finish();
}

/// Benchmark merging chunk-sized batches into a market series, newest first as
/// the provider's backward walk does.
fn bench_series_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("series_import");
    let mut rng = rand::thread_rng();

    for chunk_count in [4, 16, 64].iter() {
        let chunk_len = 24 * 7;
        let bars = generate_bars(&mut rng, chunk_len * chunk_count);
        let chunks: Vec<Vec<Bar>> = bars.chunks(chunk_len).rev().map(|c| c.to_vec()).collect();

        group.throughput(Throughput::Elements(bars.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("backward_walk", chunk_count),
            &chunks,
            |b, chunks| {
                b.iter(|| {
                    let mut series = MarketSeries::new(SeriesKey::new("BENCH", TimeFrame::H1));
                    for chunk in chunks {
                        let (start, end) = (chunk[0].open_time, chunk[chunk.len() - 1].open_time);
                        series.import(start, end, chunk.clone()).unwrap();
                    }
                    black_box(series.len())
                })
            },
        );
    }

    group.finish();
}

/// Benchmark the cache file codec on a year of hourly bars.
fn bench_cache_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_codec");
    let bars = generate_bars(&mut rand::thread_rng(), 8_784);
    let header = CacheHeader {
        start_date: bars[0].open_time,
        end_date: bars[bars.len() - 1].open_time,
        kind: ItemKind::Bar,
        count: bars.len(),
        saved_at: Utc::now(),
    };
    let bytes = codec::encode(&header, &bars).unwrap();

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode_year_h1", |b| {
        b.iter(|| black_box(codec::encode(black_box(&header), black_box(&bars)).unwrap()))
    });
    group.bench_function("decode_year_h1", |b| {
        b.iter(|| {
            let decoded: (CacheHeader, Vec<Bar>) =
                codec::decode(Path::new("bench.dat"), black_box(&bytes)).unwrap();
            black_box(decoded)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_indicator_updates,
    bench_window_appends,
    bench_series_import,
    bench_cache_codec,
);

criterion_main!(benches);
