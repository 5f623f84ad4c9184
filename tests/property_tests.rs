//! Property-based tests using quickcheck

use chrono::{DateTime, TimeZone, Utc};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use spread_monitor::{
    alerts::AlertEvaluator, resample, AlertThreshold, Granularity, KalmanParams, KalmanSmoother,
    ScoreRow, SeriesHandle, SeriesSnapshot, SymbolId, Tick, WindowStats,
};

fn ts(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

/// Ticks alternating between symbols, event times driven by `steps` (ms)
fn ticks_from(prices: &[i16], steps: &[u16]) -> Vec<Tick> {
    let mut t = 1_700_000_000_000i64;
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            t += steps.get(i).copied().unwrap_or(250) as i64;
            let symbol = if i % 2 == 0 { SymbolId::A } else { SymbolId::B };
            Tick::new(symbol, p as f64 / 10.0, ts(t))
        })
        .collect()
}

#[quickcheck]
fn prop_buffer_never_exceeds_capacity(capacity: u8, prices: Vec<i16>) -> TestResult {
    if capacity == 0 {
        return TestResult::discard();
    }
    let capacity = capacity as usize;
    let handle = SeriesHandle::new(capacity).unwrap();
    let ticks = ticks_from(&prices, &[]);

    for tick in &ticks {
        handle.append(*tick);
        if handle.len() > capacity {
            return TestResult::failed();
        }
    }

    // The snapshot is exactly the latest `capacity` ticks, in arrival order
    let kept = &ticks[ticks.len().saturating_sub(capacity)..];
    TestResult::from_bool(handle.snapshot() == SeriesSnapshot::from_ticks(kept))
}

#[quickcheck]
fn prop_snapshot_series_stay_aligned(prices: Vec<i16>) -> bool {
    let snapshot = SeriesSnapshot::from_ticks(&ticks_from(&prices, &[]));
    SymbolId::ALL
        .iter()
        .all(|&s| snapshot.prices(s).len() == snapshot.timestamps().len())
}

#[quickcheck]
fn prop_resample_is_deterministic(prices: Vec<i16>, steps: Vec<u16>) -> bool {
    let snapshot = SeriesSnapshot::from_ticks(&ticks_from(&prices, &steps));
    let required = [SymbolId::A, SymbolId::B];
    resample(&snapshot, Granularity::OneSecond, &required)
        == resample(&snapshot.clone(), Granularity::OneSecond, &required)
}

#[quickcheck]
fn prop_resample_rows_strictly_increasing(prices: Vec<i16>, steps: Vec<u16>) -> bool {
    let snapshot = SeriesSnapshot::from_ticks(&ticks_from(&prices, &steps));
    let frame = resample(&snapshot, Granularity::OneSecond, &[SymbolId::A, SymbolId::B]);
    frame
        .rows()
        .windows(2)
        .all(|w| w[0].bucket_start < w[1].bucket_start)
        && frame
            .rows()
            .iter()
            .all(|r| r.value(SymbolId::A).is_some() && r.value(SymbolId::B).is_some())
}

#[quickcheck]
fn prop_bucket_contains_timestamp(ms: i64) -> TestResult {
    // Stay well inside chrono's representable range
    if ms.abs() > 4_000_000_000_000 {
        return TestResult::discard();
    }
    let t = ts(ms);
    for granularity in [Granularity::OneSecond, Granularity::OneMinute, Granularity::FiveMinutes] {
        let start = granularity.bucket_start(t);
        let width = granularity.width_ms();
        if !(start <= t && t.timestamp_millis() < start.timestamp_millis() + width) {
            return TestResult::failed();
        }
    }
    TestResult::passed()
}

#[quickcheck]
fn prop_smoother_preserves_length(values: Vec<i16>) -> bool {
    let input: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let output = KalmanSmoother::smooth(KalmanParams::default(), &input);
    output.len() == input.len()
        && (input.len() >= 5 || output == input)
        && output.iter().all(|v| v.is_finite())
}

#[quickcheck]
fn prop_smoothed_values_stay_within_input_range(values: Vec<i16>) -> TestResult {
    if values.is_empty() {
        return TestResult::discard();
    }
    let input: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let lo = input.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = input.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let output = KalmanSmoother::smooth(KalmanParams::default(), &input);
    TestResult::from_bool(output.iter().all(|&v| v >= lo - 1e-9 && v <= hi + 1e-9))
}

#[quickcheck]
fn prop_zscore_inverts(values: Vec<i16>) -> TestResult {
    let values: Vec<f64> = values.iter().map(|&v| v as f64 / 4.0).collect();
    let stats = WindowStats::from_values(&values);
    let WindowStats::Defined { mean, std, .. } = stats else {
        return TestResult::discard();
    };

    TestResult::from_bool(values.iter().all(|&v| match stats.zscore(v) {
        Some(z) => (z * std + mean - v).abs() < 1e-6,
        None => false,
    }))
}

#[quickcheck]
fn prop_zscore_never_nan(values: Vec<i16>) -> bool {
    let values: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let stats = WindowStats::from_values(&values);
    values.iter().all(|&v| stats.zscore(v).map_or(true, f64::is_finite))
}

#[quickcheck]
fn prop_alert_iff_abs_score_reaches_threshold(score: i16, threshold: u8) -> TestResult {
    if threshold == 0 {
        return TestResult::discard();
    }
    let score = score as f64 / 100.0;
    let threshold = AlertThreshold::new(threshold as f64 / 20.0).unwrap();
    let row = ScoreRow {
        bucket_start: ts(0),
        spread: 0.0,
        smoothed_spread: 0.0,
        zscore: Some(score),
    };

    let triggered = AlertEvaluator::evaluate(Some(&row), threshold).is_triggered();
    TestResult::from_bool(triggered == (score.abs() >= threshold.value()))
}
