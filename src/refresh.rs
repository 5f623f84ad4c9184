//! The refresh cycle: snapshot → resample → spread/z-score → alert
//!
//! [`refresh`] is a pure function of its inputs. [`RefreshCycle`] owns the
//! buffer handle and the last-known-good parameters, so a bad value coming
//! from the presentation layer never reaches the pipeline.

use crate::{
    alerts::{AlertDecision, AlertEvaluator, AlertThreshold},
    buffer::{SeriesHandle, SeriesSnapshot},
    data::{ComparisonMode, Granularity, SymbolId},
    engine::{SpreadEngine, WindowStats},
    error::ConfigError,
    resample::resample,
    smoother::KalmanParams,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User-chosen parameters for one refresh
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RefreshParams {
    pub mode: ComparisonMode,
    pub granularity: Granularity,
    pub threshold: AlertThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub t: DateTime<Utc>,
    pub value: f64,
}

impl From<(DateTime<Utc>, f64)> for SeriesPoint {
    fn from((t, value): (DateTime<Utc>, f64)) -> Self {
        Self { t, value }
    }
}

/// Resampled price column for one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    pub symbol: SymbolId,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadSeries {
    pub spread: Vec<SeriesPoint>,
    pub smoothed: Vec<SeriesPoint>,
}

/// Z-score per row plus the `±threshold` reference lines
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZScoreSeries {
    pub points: Vec<(DateTime<Utc>, Option<f64>)>,
    pub upper: f64,
    pub lower: f64,
    pub stats: WindowStats,
}

/// Everything the presentation layer renders for one refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshOutput {
    pub params: RefreshParams,
    pub prices: Vec<PriceSeries>,
    /// Only in [`ComparisonMode::Both`]
    pub spread: Option<SpreadSeries>,
    /// Only in [`ComparisonMode::Both`]
    pub zscore: Option<ZScoreSeries>,
    pub alert: AlertDecision,
    /// Empty when no alert fired
    pub alert_message: String,
    pub generated_at: DateTime<Utc>,
}

impl RefreshOutput {
    /// Number of resampled rows behind the output
    pub fn row_count(&self) -> usize {
        self.prices.iter().map(|p| p.points.len()).max().unwrap_or(0)
    }
}

/// Recompute all derived series from a snapshot.
///
/// Returns `None` for an empty snapshot ("nothing to render yet").
pub fn refresh(
    snapshot: &SeriesSnapshot,
    params: &RefreshParams,
    kalman: KalmanParams,
    now: DateTime<Utc>,
) -> Option<RefreshOutput> {
    if snapshot.is_empty() {
        return None;
    }

    let required = params.mode.required_symbols();
    let frame = resample(snapshot, params.granularity, required);

    let prices = required
        .iter()
        .map(|&symbol| PriceSeries {
            symbol,
            points: frame.column(symbol).into_iter().map(SeriesPoint::from).collect(),
        })
        .collect();

    let (spread, zscore, alert) = match params.mode {
        ComparisonMode::Both => {
            let analysis = SpreadEngine::new(kalman).analyze(&frame);
            let alert = AlertEvaluator::evaluate(analysis.latest(), params.threshold);

            let spread = SpreadSeries {
                spread: analysis
                    .rows
                    .iter()
                    .map(|r| SeriesPoint { t: r.bucket_start, value: r.spread })
                    .collect(),
                smoothed: analysis
                    .rows
                    .iter()
                    .map(|r| SeriesPoint { t: r.bucket_start, value: r.smoothed_spread })
                    .collect(),
            };
            let zscore = ZScoreSeries {
                points: analysis.rows.iter().map(|r| (r.bucket_start, r.zscore)).collect(),
                upper: params.threshold.value(),
                lower: -params.threshold.value(),
                stats: analysis.stats,
            };
            (Some(spread), Some(zscore), alert)
        }
        ComparisonMode::AOnly | ComparisonMode::BOnly => (None, None, AlertDecision::NoData),
    };

    Some(RefreshOutput {
        params: *params,
        prices,
        spread,
        zscore,
        alert_message: alert.message().to_string(),
        alert,
        generated_at: now,
    })
}

/// Runs [`refresh`] against the live buffer with validated parameters
pub struct RefreshCycle {
    handle: SeriesHandle,
    kalman: KalmanParams,
    last_good: RefreshParams,
}

impl RefreshCycle {
    pub fn new(
        handle: SeriesHandle,
        kalman: KalmanParams,
        initial: RefreshParams,
    ) -> Result<Self, ConfigError> {
        kalman.validate()?;
        Ok(Self {
            handle,
            kalman,
            last_good: initial,
        })
    }

    /// Parameters the next refresh will use
    pub fn params(&self) -> RefreshParams {
        self.last_good
    }

    /// Validate raw user input field by field. Anything invalid keeps its
    /// last-known-good value.
    pub fn apply(&mut self, mode: &str, granularity: &str, threshold: f64) -> RefreshParams {
        match ComparisonMode::from_str(mode) {
            Ok(mode) => self.last_good.mode = mode,
            Err(e) => tracing::warn!(keeping = ?self.last_good.mode, "{}", e),
        }
        match Granularity::from_str(granularity) {
            Ok(granularity) => self.last_good.granularity = granularity,
            Err(e) => tracing::warn!(keeping = %self.last_good.granularity, "{}", e),
        }
        match AlertThreshold::new(threshold) {
            Ok(threshold) => self.last_good.threshold = threshold,
            Err(e) => tracing::warn!(keeping = %self.last_good.threshold, "{}", e),
        }
        self.last_good
    }

    /// Refresh with the current parameters
    pub fn run(&self, now: DateTime<Utc>) -> Option<RefreshOutput> {
        let snapshot = self.handle.snapshot();
        let output = refresh(&snapshot, &self.last_good, self.kalman, now);

        match &output {
            Some(out) => tracing::debug!(
                slots = snapshot.len(),
                rows = out.row_count(),
                triggered = out.alert.is_triggered(),
                "Refresh complete"
            ),
            None => tracing::debug!("Buffer empty, nothing to render"),
        }
        output
    }

    /// [`apply`](Self::apply) then [`run`](Self::run)
    pub fn tick(
        &mut self,
        mode: &str,
        granularity: &str,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Option<RefreshOutput> {
        self.apply(mode, granularity, threshold);
        self.run(now)
    }
}
