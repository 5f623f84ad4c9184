//! WebSocket connection management for the trade feed

use crate::{
    config::FeedConfig,
    data::{ConnectionState, ReconnectConfig},
    error::ConnectionError,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Live feed socket
pub type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the feed socket and re-opens it with backoff when it drops
pub struct ConnectionManager {
    config: FeedConfig,
    state: Arc<Mutex<ConnectionState>>,
    reconnect_strategy: ReconnectStrategy,
}

impl ConnectionManager {
    pub fn new(config: FeedConfig) -> Self {
        let reconnect_strategy = ReconnectStrategy::new(config.reconnect.clone());
        Self {
            config,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            reconnect_strategy,
        }
    }

    pub fn url(&self) -> String {
        self.config.stream_url()
    }

    /// Establish the WebSocket connection, bounded by the connect timeout
    pub async fn connect(&mut self) -> Result<FeedStream, ConnectionError> {
        self.set_state(ConnectionState::Connecting);

        let url = Url::parse(&self.url())
            .map_err(|e| ConnectionError::EstablishmentFailed(format!("Invalid URL: {}", e)))?;

        tokio::select! {
            result = connect_async(url) => {
                match result {
                    Ok((ws_stream, _)) => {
                        self.set_state(ConnectionState::Connected);
                        self.reconnect_strategy.reset();
                        tracing::info!(url = %self.url(), "Feed connection established");
                        Ok(ws_stream)
                    }
                    Err(e) => {
                        self.set_state(ConnectionState::Failed);
                        Err(ConnectionError::EstablishmentFailed(e.to_string()))
                    }
                }
            }
            _ = sleep(self.config.connect_timeout) => {
                self.set_state(ConnectionState::Failed);
                Err(ConnectionError::Timeout(format!(
                    "no handshake within {:?}",
                    self.config.connect_timeout
                )))
            }
        }
    }

    /// Retry [`connect`](Self::connect) with exponential backoff until it
    /// succeeds or the attempt limit is reached
    pub async fn reconnect(&mut self) -> Result<FeedStream, ConnectionError> {
        self.set_state(ConnectionState::Reconnecting);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let delay = self.reconnect_strategy.next_delay();
            tracing::info!("Waiting {:?} before reconnection attempt {}", delay, attempt);
            sleep(delay).await;

            match self.connect().await {
                Ok(stream) => {
                    tracing::info!("Reconnected after {} attempt(s)", attempt);
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::warn!("Reconnection attempt {} failed: {}", attempt, e);
                    if self.reconnect_strategy.exhausted(attempt) {
                        self.set_state(ConnectionState::Failed);
                        tracing::error!("Giving up after {} reconnection attempts", attempt);
                        return Err(ConnectionError::RetriesExhausted(attempt));
                    }
                }
            }
        }
    }

    pub fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.lock(), ConnectionState::Connected)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }
}

/// Reconnection strategy with exponential backoff and jitter
pub struct ReconnectStrategy {
    config: ReconnectConfig,
    current_delay: Duration,
}

impl ReconnectStrategy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
        }
    }

    /// Delay before the next attempt; grows geometrically up to `max_delay`
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current_delay;

        let next_ms = (base.as_millis() as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay = std::cmp::min(Duration::from_millis(next_ms), self.config.max_delay);

        let delay = self.apply_jitter(base);
        tracing::debug!("Backoff: delay = {:?}, next base = {:?}", delay, self.current_delay);
        delay
    }

    /// Whether `attempts` consecutive failures used up the budget
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.config.max_attempts != 0 && attempts >= self.config.max_attempts
    }

    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }
        let spread = delay.as_millis() as f64 * self.config.jitter_factor;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let jittered = (delay.as_millis() as f64 + offset).max(0.0) as u64;
        std::cmp::min(Duration::from_millis(jittered), self.config.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter: f64, max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            backoff_multiplier: 2.0,
            jitter_factor: jitter,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut strategy = ReconnectStrategy::new(config(0.0, 0));
        let delays: Vec<u128> = (0..6).map(|_| strategy.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);

        strategy.reset();
        assert_eq!(strategy.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let mut strategy = ReconnectStrategy::new(config(0.5, 0));
        for _ in 0..50 {
            strategy.reset();
            let delay = strategy.next_delay().as_millis();
            assert!((50..=150).contains(&delay), "delay {} out of band", delay);
        }
    }

    #[test]
    fn test_zero_attempts_never_exhausts() {
        let unlimited = ReconnectStrategy::new(config(0.0, 0));
        assert!(!unlimited.exhausted(u32::MAX));

        let limited = ReconnectStrategy::new(config(0.0, 3));
        assert!(!limited.exhausted(2));
        assert!(limited.exhausted(3));
    }

    #[test]
    fn test_manager_starts_disconnected() {
        let manager = ConnectionManager::new(FeedConfig::default());
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
        assert!(manager.url().contains("btcusdt@trade/ethusdt@trade"));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let feed = FeedConfig {
            endpoint: "ws://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let mut manager = ConnectionManager::new(feed);
        assert!(manager.connect().await.is_err());
        assert_eq!(manager.connection_state(), ConnectionState::Failed);
    }
}
