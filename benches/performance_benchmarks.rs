//! Performance benchmarks for the spread monitor refresh path

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spread_monitor::{
    refresh, resample, BinanceTradeParser, Granularity, KalmanParams, KalmanSmoother,
    RefreshParams, SeriesHandle, SeriesSnapshot, SymbolId, SymbolPair, Tick, TradeParser,
};

/// `n` alternating ticks, roughly four per second
fn ticks(n: usize) -> Vec<Tick> {
    (0..n)
        .map(|i| {
            let t = Utc.timestamp_millis_opt(1_700_000_000_000 + i as i64 * 250).unwrap();
            let wobble = (i as f64 * 0.37).sin();
            if i % 2 == 0 {
                Tick::new(SymbolId::A, 42_000.0 + wobble * 15.0, t)
            } else {
                Tick::new(SymbolId::B, 2_200.0 + wobble * 2.0, t)
            }
        })
        .collect()
}

fn bench_buffer_append(c: &mut Criterion) {
    let handle = SeriesHandle::new(300).unwrap();
    let input = ticks(1_000);

    c.bench_function("buffer_append_1000", |b| {
        b.iter(|| {
            for tick in &input {
                handle.append(black_box(*tick));
            }
        })
    });
}

fn bench_parse_trade(c: &mut Criterion) {
    let parser = BinanceTradeParser::new(SymbolPair::default());
    let message = r#"{"stream":"btcusdt@trade","data":{"e":"trade","E":1700000000123,"s":"BTCUSDT","t":1,"p":"37251.40","q":"0.012","T":1700000000100,"m":true}}"#;
    let now = Utc::now();

    c.bench_function("parse_trade", |b| {
        b.iter(|| {
            let _ = parser.parse_trade(black_box(message), now);
        })
    });
}

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");
    for size in [100, 300, 1_000] {
        let snapshot = SeriesSnapshot::from_ticks(&ticks(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &snapshot, |b, snapshot| {
            b.iter(|| resample(black_box(snapshot), Granularity::OneSecond, &SymbolId::ALL))
        });
    }
    group.finish();
}

fn bench_smooth(c: &mut Criterion) {
    let mut group = c.benchmark_group("kalman_smooth");
    for size in [75, 300] {
        let values: Vec<f64> = (0..size).map(|i| (i as f64 * 0.1).sin() * 4.0 + 3.0).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &values, |b, values| {
            b.iter(|| KalmanSmoother::smooth(KalmanParams::default(), black_box(values)))
        });
    }
    group.finish();
}

fn bench_refresh(c: &mut Criterion) {
    let snapshot = SeriesSnapshot::from_ticks(&ticks(300));
    let params = RefreshParams::default();
    let now = Utc::now();

    c.bench_function("refresh_300", |b| {
        b.iter(|| refresh(black_box(&snapshot), &params, KalmanParams::default(), now))
    });
}

criterion_group!(
    benches,
    bench_buffer_append,
    bench_parse_trade,
    bench_resample,
    bench_smooth,
    bench_refresh
);
criterion_main!(benches);
