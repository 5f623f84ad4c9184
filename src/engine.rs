//! Spread and rolling z-score over a resampled frame

use crate::{
    data::SymbolId,
    resample::ResampledFrame,
    smoother::{KalmanParams, KalmanSmoother},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Relative tolerance below which the window std counts as zero
pub const DEGENERATE_STD_TOLERANCE: f64 = 1e-12;

/// Why window statistics could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UndefinedReason {
    /// Fewer than two rows
    InsufficientRows,
    /// Spread is constant over the window
    ZeroVariance,
    /// A spread value was NaN or infinite
    NonFinite,
}

/// Mean and sample standard deviation of the raw spread
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum WindowStats {
    Defined { mean: f64, std: f64, count: usize },
    Undefined(UndefinedReason),
}

impl WindowStats {
    /// Single-pass (Welford) mean and sample std
    pub fn from_values(values: &[f64]) -> Self {
        if values.len() < 2 {
            return WindowStats::Undefined(UndefinedReason::InsufficientRows);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return WindowStats::Undefined(UndefinedReason::NonFinite);
        }

        let mut mean = 0.0;
        let mut m2 = 0.0;
        for (i, &value) in values.iter().enumerate() {
            let delta = value - mean;
            mean += delta / (i + 1) as f64;
            m2 += delta * (value - mean);
        }

        let std = (m2 / (values.len() - 1) as f64).sqrt();
        if !std.is_finite() || !mean.is_finite() {
            return WindowStats::Undefined(UndefinedReason::NonFinite);
        }
        if std <= DEGENERATE_STD_TOLERANCE * mean.abs().max(1.0) {
            return WindowStats::Undefined(UndefinedReason::ZeroVariance);
        }

        WindowStats::Defined { mean, std, count: values.len() }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, WindowStats::Defined { .. })
    }

    /// Standardized score of `value`, `None` when the window is undefined
    pub fn zscore(&self, value: f64) -> Option<f64> {
        match *self {
            WindowStats::Defined { mean, std, .. } => {
                let z = (value - mean) / std;
                z.is_finite().then_some(z)
            }
            WindowStats::Undefined(_) => None,
        }
    }
}

/// Derived values for one resampled row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRow {
    pub bucket_start: DateTime<Utc>,
    pub spread: f64,
    pub smoothed_spread: f64,
    pub zscore: Option<f64>,
}

/// Result of analysing one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadAnalysis {
    pub rows: Vec<ScoreRow>,
    pub stats: WindowStats,
}

impl SpreadAnalysis {
    pub fn latest(&self) -> Option<&ScoreRow> {
        self.rows.last()
    }
}

/// Computes `A - B`, its Kalman-smoothed version and the z-score of every row
#[derive(Debug, Clone, Default)]
pub struct SpreadEngine {
    params: KalmanParams,
}

impl SpreadEngine {
    /// Invalid noise parameters are replaced by the defaults
    pub fn new(params: KalmanParams) -> Self {
        match params.validate() {
            Ok(()) => Self { params },
            Err(e) => {
                tracing::warn!(?params, "{}; using default smoother parameters", e);
                Self::default()
            }
        }
    }

    pub fn params(&self) -> &KalmanParams {
        &self.params
    }

    pub fn analyze(&self, frame: &ResampledFrame) -> SpreadAnalysis {
        let (starts, spreads): (Vec<DateTime<Utc>>, Vec<f64>) = frame
            .rows()
            .iter()
            .filter_map(|row| {
                let a = row.value(SymbolId::A)?;
                let b = row.value(SymbolId::B)?;
                Some((row.bucket_start, a - b))
            })
            .unzip();

        let smoothed = KalmanSmoother::smooth(self.params, &spreads);
        let stats = WindowStats::from_values(&spreads);

        if let WindowStats::Undefined(reason) = stats {
            tracing::debug!(rows = spreads.len(), ?reason, "z-score undefined for window");
        }

        let rows = starts
            .into_iter()
            .zip(spreads)
            .zip(smoothed)
            .map(|((bucket_start, spread), smoothed_spread)| ScoreRow {
                bucket_start,
                spread,
                smoothed_spread,
                zscore: stats.zscore(spread),
            })
            .collect();

        SpreadAnalysis { rows, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::SeriesSnapshot,
        data::{Granularity, Tick},
        resample::resample,
    };
    use chrono::TimeZone;

    fn frame(pairs: &[(f64, f64)]) -> ResampledFrame {
        let ticks: Vec<Tick> = pairs
            .iter()
            .enumerate()
            .flat_map(|(i, (a, b))| {
                let ts = Utc.timestamp_millis_opt(i as i64 * 1_000).unwrap();
                [Tick::new(SymbolId::A, *a, ts), Tick::new(SymbolId::B, *b, ts)]
            })
            .collect();
        resample(
            &SeriesSnapshot::from_ticks(&ticks),
            Granularity::OneSecond,
            &[SymbolId::A, SymbolId::B],
        )
    }

    #[test]
    fn test_zscore_inverts_to_spread() {
        let analysis = SpreadEngine::default().analyze(&frame(&[
            (10.0, 1.0),
            (12.0, 1.0),
            (9.0, 1.0),
            (15.0, 1.0),
            (11.0, 1.0),
        ]));

        let WindowStats::Defined { mean, std, count } = analysis.stats else {
            panic!("expected defined stats");
        };
        assert_eq!(count, 5);
        for row in &analysis.rows {
            let z = row.zscore.unwrap();
            assert!((z * std + mean - row.spread).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sample_std_used() {
        let stats = WindowStats::from_values(&[1.0, 2.0, 3.0, 4.0]);
        let WindowStats::Defined { mean, std, .. } = stats else {
            panic!("expected defined stats");
        };
        assert!((mean - 2.5).abs() < 1e-12);
        assert!((std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_spread_is_undefined() {
        let analysis = SpreadEngine::default().analyze(&frame(&[(100.1, 97.1); 6]));
        assert_eq!(analysis.stats, WindowStats::Undefined(UndefinedReason::ZeroVariance));
        assert!(analysis.rows.iter().all(|r| r.zscore.is_none()));
    }

    #[test]
    fn test_single_row_is_insufficient() {
        let analysis = SpreadEngine::default().analyze(&frame(&[(5.0, 2.0)]));
        assert_eq!(analysis.rows.len(), 1);
        assert_eq!(analysis.stats, WindowStats::Undefined(UndefinedReason::InsufficientRows));
        assert_eq!(analysis.rows[0].smoothed_spread, 3.0);
    }

    #[test]
    fn test_non_finite_is_reported() {
        assert_eq!(
            WindowStats::from_values(&[1.0, f64::NAN, 2.0]),
            WindowStats::Undefined(UndefinedReason::NonFinite)
        );
    }

    #[test]
    fn test_invalid_params_fall_back_to_defaults() {
        let zero = KalmanParams {
            process_noise: 0.0,
            observation_noise: 0.0,
            initial_variance: 0.0,
        };
        let engine = SpreadEngine::new(zero);
        assert_eq!(engine.params(), &KalmanParams::default());

        let analysis = engine.analyze(&frame(&[
            (10.0, 1.0),
            (12.0, 1.0),
            (9.0, 1.0),
            (15.0, 1.0),
            (11.0, 1.0),
            (13.0, 1.0),
        ]));
        assert!(analysis.rows.iter().all(|r| r.smoothed_spread.is_finite()));
    }

    #[test]
    fn test_empty_frame() {
        let analysis = SpreadEngine::default().analyze(&frame(&[]));
        assert!(analysis.latest().is_none());
    }
}
