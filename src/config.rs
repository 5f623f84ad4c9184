//! Process configuration
//!
//! Values come from `SPREAD_MONITOR_*` environment variables (a `.env` file
//! is honoured), falling back to defaults for anything unset.

use crate::{
    alerts::AlertThreshold,
    buffer::DEFAULT_CAPACITY,
    data::{ComparisonMode, Granularity, ReconnectConfig, SymbolPair, TrackedSymbol},
    error::ConfigError,
    refresh::RefreshParams,
    smoother::KalmanParams,
};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const ENV_PREFIX: &str = "SPREAD_MONITOR_";
pub const DEFAULT_ENDPOINT: &str = "wss://fstream.binance.com";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(2_000);

/// Where and how to connect to the trade feed
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Base WebSocket URL; the combined-stream path is appended
    pub endpoint: String,
    pub symbols: SymbolPair,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl FeedConfig {
    /// Combined stream URL, e.g. `.../stream?streams=btcusdt@trade/ethusdt@trade`
    pub fn stream_url(&self) -> String {
        format!(
            "{}/stream?streams={}/{}",
            self.endpoint.trim_end_matches('/'),
            self.symbols.a.trade_stream(),
            self.symbols.b.trade_stream()
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.stream_url())
            .map_err(|e| ConfigError::invalid("endpoint", e.to_string()))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConfigError::invalid("endpoint", "must be a ws:// or wss:// URL"));
        }

        if self.symbols.a.symbol.is_empty() || self.symbols.b.symbol.is_empty() {
            return Err(ConfigError::invalid("symbols", "symbols cannot be empty"));
        }
        if self.symbols.a.symbol == self.symbols.b.symbol {
            return Err(ConfigError::invalid("symbols", "the two tracked symbols must differ"));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid("connect_timeout", "must be greater than 0"));
        }

        self.reconnect.validate()
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            symbols: SymbolPair::default(),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Everything the binary needs to run
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub feed: FeedConfig,
    pub buffer_capacity: usize,
    pub refresh_interval: Duration,
    /// Parameters used until the presentation layer supplies others
    pub refresh: RefreshParams,
    pub kalman: KalmanParams,
    pub webhook_url: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            buffer_capacity: DEFAULT_CAPACITY,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh: RefreshParams::default(),
            kalman: KalmanParams::default(),
            webhook_url: None,
        }
    }
}

impl MonitorConfig {
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::new()
    }

    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (keys include [`ENV_PREFIX`])
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(endpoint) = get("ENDPOINT") {
            config.feed.endpoint = endpoint;
        }
        if let Some(symbol) = get("SYMBOL_A") {
            config.feed.symbols.a = TrackedSymbol::from_symbol(&symbol);
        }
        if let Some(symbol) = get("SYMBOL_B") {
            config.feed.symbols.b = TrackedSymbol::from_symbol(&symbol);
        }
        if let Some(attempts) = get("MAX_RECONNECT_ATTEMPTS") {
            config.feed.reconnect.max_attempts = parse_field("MAX_RECONNECT_ATTEMPTS", &attempts)?;
        }
        if let Some(capacity) = get("BUFFER_CAPACITY") {
            config.buffer_capacity = parse_field("BUFFER_CAPACITY", &capacity)?;
        }
        if let Some(ms) = get("REFRESH_INTERVAL_MS") {
            config.refresh_interval = Duration::from_millis(parse_field("REFRESH_INTERVAL_MS", &ms)?);
        }
        if let Some(mode) = get("MODE") {
            config.refresh.mode = ComparisonMode::from_str(&mode)?;
        }
        if let Some(granularity) = get("GRANULARITY") {
            config.refresh.granularity = Granularity::from_str(&granularity)?;
        }
        if let Some(threshold) = get("THRESHOLD") {
            config.refresh.threshold = AlertThreshold::new(parse_field("THRESHOLD", &threshold)?)?;
        }
        if let Some(q) = get("PROCESS_NOISE") {
            config.kalman.process_noise = parse_field("PROCESS_NOISE", &q)?;
        }
        if let Some(r) = get("OBSERVATION_NOISE") {
            config.kalman.observation_noise = parse_field("OBSERVATION_NOISE", &r)?;
        }
        if let Some(p0) = get("INITIAL_VARIANCE") {
            config.kalman.initial_variance = parse_field("INITIAL_VARIANCE", &p0)?;
        }
        config.webhook_url = get("WEBHOOK_URL");

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feed.validate()?;

        if self.buffer_capacity == 0 {
            return Err(ConfigError::invalid("buffer_capacity", "must be greater than 0"));
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::invalid("refresh_interval", "must be greater than 0"));
        }
        self.kalman.validate()?;

        if let Some(url) = &self.webhook_url {
            let parsed = Url::parse(url).map_err(|e| ConfigError::invalid("webhook_url", e.to_string()))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::invalid("webhook_url", "must be an http(s) URL"));
            }
        }

        Ok(())
    }
}

fn parse_field<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::invalid(field, format!("{:?}: {}", raw, e)))
}

/// Builder pattern for monitor configuration
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.config.feed.endpoint = endpoint.to_string();
        self
    }

    pub fn symbols(mut self, symbols: SymbolPair) -> Self {
        self.config.feed.symbols = symbols;
        self
    }

    pub fn reconnect_config(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.feed.reconnect = reconnect;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    pub fn refresh_params(mut self, params: RefreshParams) -> Self {
        self.config.refresh = params;
        self
    }

    pub fn kalman(mut self, params: KalmanParams) -> Self {
        self.config.kalman = params;
        self
    }

    pub fn webhook_url(mut self, url: &str) -> Self {
        self.config.webhook_url = Some(url.to_string());
        self
    }

    pub fn build(self) -> Result<MonitorConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for MonitorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
