//! Time-bucket resampling of irregular ticks onto a regular grid
//!
//! Buckets are left-closed and anchored to the Unix epoch, so the same tick
//! always lands in the same bucket no matter when the snapshot was taken.
//! Within a bucket each symbol keeps its highest-timestamp observation; ties
//! go to the later arrival.

use crate::{
    buffer::SeriesSnapshot,
    data::{Granularity, SymbolId},
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One non-empty bucket of the resampled grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResampledRow {
    pub bucket_start: DateTime<Utc>,
    values: [Option<f64>; 2],
}

impl ResampledRow {
    pub fn value(&self, symbol: SymbolId) -> Option<f64> {
        self.values[symbol.index()]
    }
}

/// Time-ordered rows produced by [`resample`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResampledFrame {
    pub granularity: Granularity,
    rows: Vec<ResampledRow>,
}

impl ResampledFrame {
    pub fn rows(&self) -> &[ResampledRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(bucket_start, value)` for every row where `symbol` has a value
    pub fn column(&self, symbol: SymbolId) -> Vec<(DateTime<Utc>, f64)> {
        self.rows
            .iter()
            .filter_map(|row| row.value(symbol).map(|v| (row.bucket_start, v)))
            .collect()
    }
}

/// Last observation per symbol in a bucket: (timestamp, price)
type BucketSlots = [Option<(DateTime<Utc>, f64)>; 2];

/// Resample a snapshot, keeping only buckets where every `required` symbol
/// was observed
pub fn resample(
    snapshot: &SeriesSnapshot,
    granularity: Granularity,
    required: &[SymbolId],
) -> ResampledFrame {
    let mut buckets: BTreeMap<i64, BucketSlots> = BTreeMap::new();

    for symbol in SymbolId::ALL {
        for (ts, price) in snapshot.observations(symbol) {
            let slots = buckets.entry(granularity.bucket_key(ts)).or_default();
            let slot = &mut slots[symbol.index()];
            let newer = match *slot {
                Some((last_ts, _)) => ts >= last_ts,
                None => true,
            };
            if newer {
                *slot = Some((ts, price));
            }
        }
    }

    let rows = buckets
        .into_iter()
        .filter(|(_, slots)| required.iter().all(|s| slots[s.index()].is_some()))
        .filter_map(|(key, slots)| {
            let bucket_start = Utc.timestamp_millis_opt(key).single()?;
            Some(ResampledRow {
                bucket_start,
                values: [slots[0].map(|(_, p)| p), slots[1].map(|(_, p)| p)],
            })
        })
        .collect();

    ResampledFrame { granularity, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Tick;

    fn tick(symbol: SymbolId, price: f64, ms: i64) -> Tick {
        Tick::new(symbol, price, Utc.timestamp_millis_opt(ms).unwrap())
    }

    const BOTH: &[SymbolId] = &[SymbolId::A, SymbolId::B];

    #[test]
    fn test_inner_join_drops_one_sided_buckets() {
        let snapshot = SeriesSnapshot::from_ticks(&[
            tick(SymbolId::A, 10.0, 0),
            tick(SymbolId::B, 100.0, 0),
            tick(SymbolId::A, 11.0, 400),
            tick(SymbolId::B, 101.0, 900),
            tick(SymbolId::A, 12.0, 1_200),
        ]);

        let frame = resample(&snapshot, Granularity::OneSecond, BOTH);
        assert_eq!(frame.len(), 1);

        let row = &frame.rows()[0];
        assert_eq!(row.bucket_start, Utc.timestamp_millis_opt(0).unwrap());
        assert_eq!(row.value(SymbolId::A), Some(11.0));
        assert_eq!(row.value(SymbolId::B), Some(101.0));
    }

    #[test]
    fn test_single_symbol_keeps_its_own_buckets() {
        let snapshot = SeriesSnapshot::from_ticks(&[
            tick(SymbolId::A, 10.0, 0),
            tick(SymbolId::A, 12.0, 1_200),
            tick(SymbolId::B, 100.0, 2_500),
        ]);

        let frame = resample(&snapshot, Granularity::OneSecond, &[SymbolId::A]);
        let column = frame.column(SymbolId::A);
        assert_eq!(column.len(), 2);
        assert_eq!(column[1].1, 12.0);
    }

    #[test]
    fn test_out_of_order_arrival_keeps_latest_timestamp() {
        let snapshot = SeriesSnapshot::from_ticks(&[
            tick(SymbolId::A, 1.0, 700),
            tick(SymbolId::A, 2.0, 300),
            tick(SymbolId::B, 5.0, 100),
        ]);

        let frame = resample(&snapshot, Granularity::OneSecond, BOTH);
        assert_eq!(frame.rows()[0].value(SymbolId::A), Some(1.0));
    }

    #[test]
    fn test_equal_timestamps_prefer_later_arrival() {
        let snapshot = SeriesSnapshot::from_ticks(&[
            tick(SymbolId::A, 1.0, 500),
            tick(SymbolId::A, 2.0, 500),
            tick(SymbolId::B, 5.0, 500),
        ]);

        let frame = resample(&snapshot, Granularity::OneSecond, BOTH);
        assert_eq!(frame.rows()[0].value(SymbolId::A), Some(2.0));
    }

    #[test]
    fn test_rows_are_time_ordered_across_minutes() {
        let snapshot = SeriesSnapshot::from_ticks(&[
            tick(SymbolId::A, 3.0, 125_000),
            tick(SymbolId::B, 30.0, 130_000),
            tick(SymbolId::A, 1.0, 5_000),
            tick(SymbolId::B, 10.0, 59_999),
        ]);

        let frame = resample(&snapshot, Granularity::OneMinute, BOTH);
        let starts: Vec<i64> = frame.rows().iter().map(|r| r.bucket_start.timestamp_millis()).collect();
        assert_eq!(starts, vec![0, 120_000]);
    }

    #[test]
    fn test_resample_is_deterministic() {
        let snapshot = SeriesSnapshot::from_ticks(&[
            tick(SymbolId::A, 10.0, 0),
            tick(SymbolId::B, 7.0, 10),
            tick(SymbolId::A, 11.0, 61_000),
            tick(SymbolId::B, 8.0, 62_000),
        ]);

        let first = resample(&snapshot, Granularity::FiveMinutes, BOTH);
        let second = resample(&snapshot, Granularity::FiveMinutes, BOTH);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_empty_snapshot_yields_empty_frame() {
        let frame = resample(&SeriesSnapshot::default(), Granularity::OneSecond, BOTH);
        assert!(frame.is_empty());
    }
}
