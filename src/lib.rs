//! # Spread Monitor
//!
//! Real-time monitor for the price spread between two trading symbols.
//!
//! Trades from a streaming feed land in a bounded, shared buffer. On every
//! refresh the buffer is resampled onto a regular time grid, the spread
//! between the two symbols is Kalman-smoothed and standardized against the
//! window, and a z-score alert fires when `|z|` reaches the threshold.
//!
//! ## Quick Start
//! ```rust,ignore
//! use spread_monitor::prelude::*;
//!
//! let handle = SeriesHandle::new(DEFAULT_CAPACITY)?;
//! let adapter = IngestionAdapter::new(handle.clone(), SymbolPair::default());
//! let mut cycle = RefreshCycle::new(handle, KalmanParams::default(), RefreshParams::default())?;
//!
//! if let Some(output) = cycle.tick("BTC_ETH", "1S", 2.0, chrono::Utc::now()) {
//!     println!("{}", output.alert_message);
//! }
//! ```

pub mod alerts;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod data;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod parser;
pub mod refresh;
pub mod resample;
pub mod smoother;

pub use alerts::{
    Alert, AlertChannel, AlertDecision, AlertEvaluator, AlertRouter, AlertSeverity,
    AlertThreshold, ConsoleChannel, WebhookChannel,
};
pub use buffer::{SeriesHandle, SeriesSnapshot, DEFAULT_CAPACITY};
pub use config::{FeedConfig, MonitorConfig, MonitorConfigBuilder};
pub use data::*;
pub use engine::{ScoreRow, SpreadAnalysis, SpreadEngine, UndefinedReason, WindowStats};
pub use error::*;
pub use ingest::{IngestStats, IngestStatsSnapshot, IngestionAdapter, StreamEnd};
pub use parser::{BinanceTradeParser, Extracted, ParsedTick, TradeParser};
pub use refresh::{refresh, RefreshCycle, RefreshOutput, RefreshParams};
pub use resample::{resample, ResampledFrame, ResampledRow};
pub use smoother::{KalmanParams, KalmanSmoother, SmootherState};

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOGGING: Once = Once::new();

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info` with the socket
/// and HTTP crates held at `warn`. Calling this more than once is a no-op.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tungstenite=warn,tokio_tungstenite=warn,hyper=warn,reqwest=warn")
        });

        // A subscriber set elsewhere (e.g. by a test harness) wins
        let _ = tracing_subscriber::fmt()
            .with_target(true)
            .with_env_filter(filter)
            .try_init();
    });
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::alerts::{AlertDecision, AlertRouter, AlertThreshold};
    pub use crate::buffer::{SeriesHandle, DEFAULT_CAPACITY};
    pub use crate::config::MonitorConfig;
    pub use crate::data::{ComparisonMode, Granularity, SymbolId, SymbolPair, Tick};
    pub use crate::error::{ConfigError, MonitorError};
    pub use crate::ingest::IngestionAdapter;
    pub use crate::refresh::{RefreshCycle, RefreshOutput, RefreshParams};
    pub use crate::smoother::KalmanParams;
    pub use crate::init_logging;
}
