//! Data models for ticks, symbols and refresh parameters

use crate::error::ConfigError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One of the two tracked assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolId {
    A,
    B,
}

impl SymbolId {
    pub const ALL: [SymbolId; 2] = [SymbolId::A, SymbolId::B];

    /// Position of this symbol in per-symbol arrays
    pub fn index(self) -> usize {
        match self {
            SymbolId::A => 0,
            SymbolId::B => 1,
        }
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolId::A => f.write_str("A"),
            SymbolId::B => f.write_str("B"),
        }
    }
}

/// Exchange symbol and display label bound to a [`SymbolId`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSymbol {
    /// Exchange symbol, e.g. `BTCUSDT`
    pub symbol: String,
    /// Short label used in series names, e.g. `BTC`
    pub label: String,
}

impl TrackedSymbol {
    pub fn new(symbol: &str, label: &str) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            label: label.to_string(),
        }
    }

    /// Derive the label by stripping a common quote currency suffix
    pub fn from_symbol(symbol: &str) -> Self {
        let upper = symbol.to_uppercase();
        let label = ["USDT", "USDC", "BUSD", "USD"]
            .iter()
            .find_map(|quote| upper.strip_suffix(*quote).filter(|base| !base.is_empty()))
            .unwrap_or(upper.as_str())
            .to_string();
        Self { symbol: upper, label }
    }

    /// Binance trade stream name, e.g. `btcusdt@trade`
    pub fn trade_stream(&self) -> String {
        format!("{}@trade", self.symbol.to_lowercase())
    }
}

/// The pair of assets being compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolPair {
    pub a: TrackedSymbol,
    pub b: TrackedSymbol,
}

impl SymbolPair {
    pub fn new(a: TrackedSymbol, b: TrackedSymbol) -> Self {
        Self { a, b }
    }

    pub fn get(&self, id: SymbolId) -> &TrackedSymbol {
        match id {
            SymbolId::A => &self.a,
            SymbolId::B => &self.b,
        }
    }

    pub fn label(&self, id: SymbolId) -> &str {
        &self.get(id).label
    }

    /// Resolve an exchange symbol (any case) to its id
    pub fn resolve(&self, symbol: &str) -> Option<SymbolId> {
        SymbolId::ALL
            .into_iter()
            .find(|id| self.get(*id).symbol.eq_ignore_ascii_case(symbol))
    }

    /// Resolve a combined-stream name such as `btcusdt@trade`
    pub fn resolve_stream(&self, stream: &str) -> Option<SymbolId> {
        let base = stream.split('@').next().unwrap_or(stream);
        self.resolve(base)
    }
}

impl Default for SymbolPair {
    fn default() -> Self {
        Self {
            a: TrackedSymbol::new("BTCUSDT", "BTC"),
            b: TrackedSymbol::new("ETHUSDT", "ETH"),
        }
    }
}

/// A single timestamped trade price for one tracked symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: SymbolId,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(symbol: SymbolId, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self { symbol, price, timestamp }
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tick[{}]: {} @ {}", self.symbol, self.price, self.timestamp)
    }
}

/// Which series the refresh cycle produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComparisonMode {
    /// Both prices, spread, smoothed spread and z-score
    #[default]
    Both,
    AOnly,
    BOnly,
}

impl ComparisonMode {
    /// Symbols that must be present in a bucket for it to produce a row
    pub fn required_symbols(self) -> &'static [SymbolId] {
        match self {
            ComparisonMode::Both => &[SymbolId::A, SymbolId::B],
            ComparisonMode::AOnly => &[SymbolId::A],
            ComparisonMode::BOnly => &[SymbolId::B],
        }
    }
}

impl FromStr for ComparisonMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BOTH" | "BTC_ETH" | "A_B" => Ok(ComparisonMode::Both),
            "A_ONLY" | "A" | "BTC" => Ok(ComparisonMode::AOnly),
            "B_ONLY" | "B" | "ETH" => Ok(ComparisonMode::BOnly),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            ComparisonMode::Both => "BOTH",
            ComparisonMode::AOnly => "A_ONLY",
            ComparisonMode::BOnly => "B_ONLY",
        };
        f.write_str(mode)
    }
}

/// Resample bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Granularity {
    #[default]
    OneSecond,
    OneMinute,
    FiveMinutes,
}

impl Granularity {
    pub fn width_ms(self) -> i64 {
        match self {
            Granularity::OneSecond => 1_000,
            Granularity::OneMinute => 60_000,
            Granularity::FiveMinutes => 300_000,
        }
    }

    /// Epoch-anchored bucket key (ms) containing `ts`
    pub fn bucket_key(self, ts: DateTime<Utc>) -> i64 {
        let width = self.width_ms();
        ts.timestamp_millis().div_euclid(width) * width
    }

    /// Start of the left-closed bucket containing `ts`
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.bucket_key(ts))
            .single()
            .unwrap_or(ts)
    }
}

impl FromStr for Granularity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1S" | "SUB_SECOND" | "ONE_SECOND" => Ok(Granularity::OneSecond),
            "1T" | "1M" | "1MIN" | "ONE_MINUTE" => Ok(Granularity::OneMinute),
            "5T" | "5M" | "5MIN" | "FIVE_MINUTE" | "FIVE_MINUTES" => Ok(Granularity::FiveMinutes),
            _ => Err(ConfigError::UnknownGranularity(s.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = match self {
            Granularity::OneSecond => "1S",
            Granularity::OneMinute => "1T",
            Granularity::FiveMinutes => "5T",
        };
        f.write_str(rule)
    }
}

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum consecutive attempts; 0 retries forever
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0) applied to each delay
    pub jitter_factor: f64,
}

impl ReconnectConfig {
    /// Validate reconnection configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay.as_millis() == 0 {
            return Err(ConfigError::invalid("initial_delay", "must be greater than 0"));
        }

        if self.max_delay < self.initial_delay {
            return Err(ConfigError::invalid(
                "max_delay",
                "must be greater than or equal to initial delay",
            ));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("backoff_multiplier", "must be at least 1.0"));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::invalid("jitter_factor", "must be within 0.0..=1.0"));
        }

        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

/// Connection state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}
