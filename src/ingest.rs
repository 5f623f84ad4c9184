//! Ingestion adapter: feed frames in, ticks appended to the shared buffer
//!
//! The adapter never waits on readers of the buffer. A bad frame is counted
//! and skipped; a dropped socket is re-opened with backoff until shutdown.

use crate::{
    buffer::SeriesHandle,
    config::FeedConfig,
    connection::ConnectionManager,
    data::{SymbolPair, Tick},
    error::{ConnectionError, ErrorReporter, MonitorError, ParseError},
    parser::{BinanceTradeParser, TradeParser},
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, Message};

/// Running counters, shared with whoever wants to report them
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    appended: AtomicU64,
    parse_faults: AtomicU64,
    defaulted_prices: AtomicU64,
    defaulted_timestamps: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IngestStatsSnapshot {
    pub received: u64,
    pub appended: u64,
    pub parse_faults: u64,
    pub defaulted_prices: u64,
    pub defaulted_timestamps: u64,
    pub reconnects: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            parse_faults: self.parse_faults.load(Ordering::Relaxed),
            defaulted_prices: self.defaulted_prices.load(Ordering::Relaxed),
            defaulted_timestamps: self.defaulted_timestamps.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Why a single socket session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Shutdown was requested
    Shutdown,
    /// Server closed the socket or the stream ran out
    Closed,
    /// Transport error
    Failed(String),
}

/// Turns feed frames into buffer appends
#[derive(Clone)]
pub struct IngestionAdapter {
    handle: SeriesHandle,
    parser: Arc<dyn TradeParser>,
    stats: Arc<IngestStats>,
}

impl IngestionAdapter {
    /// Adapter for the Binance trade feed of `symbols`
    pub fn new(handle: SeriesHandle, symbols: SymbolPair) -> Self {
        Self::with_parser(handle, Arc::new(BinanceTradeParser::new(symbols)))
    }

    pub fn with_parser(handle: SeriesHandle, parser: Arc<dyn TradeParser>) -> Self {
        Self {
            handle,
            parser,
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn handle(&self) -> &SeriesHandle {
        &self.handle
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Parse one text frame and append the tick
    pub fn handle_text(&self, text: &str) -> Result<Tick, ParseError> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let parsed = match self.parser.parse_trade(text, Utc::now()) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.parse_faults.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        if parsed.price_defaulted {
            self.stats.defaulted_prices.fetch_add(1, Ordering::Relaxed);
        }
        if parsed.timestamp_defaulted {
            self.stats.defaulted_timestamps.fetch_add(1, Ordering::Relaxed);
        }

        self.handle.append(parsed.tick);
        self.stats.appended.fetch_add(1, Ordering::Relaxed);
        Ok(parsed.tick)
    }

    fn handle_message(&self, message: Message) -> Option<StreamEnd> {
        match message {
            Message::Text(text) => {
                if let Err(e) = self.handle_text(&text) {
                    match e {
                        ParseError::NotATrade(_) => tracing::debug!("Skipping frame: {}", e),
                        _ => ErrorReporter::report_error(&MonitorError::Parse(e), "ingest"),
                    }
                }
            }
            Message::Binary(data) => {
                tracing::debug!("Ignoring binary frame: {} bytes", data.len());
            }
            Message::Ping(_) => {
                // tungstenite queues the pong itself
                tracing::trace!("Received ping");
            }
            Message::Pong(_) => {
                tracing::trace!("Received pong");
            }
            Message::Close(frame) => {
                tracing::info!(?frame, "Feed closed by server");
                return Some(StreamEnd::Closed);
            }
            _ => {
                tracing::debug!("Received other message type");
            }
        }
        None
    }

    /// Drain one socket session until it ends or shutdown fires
    pub async fn consume<S>(&self, mut stream: S, shutdown: &mut watch::Receiver<bool>) -> StreamEnd
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                _ = wait_for_shutdown(shutdown) => return StreamEnd::Shutdown,
                next = stream.next() => match next {
                    Some(Ok(message)) => {
                        if let Some(end) = self.handle_message(message) {
                            return end;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("Feed transport error: {}", e);
                        return StreamEnd::Failed(e.to_string());
                    }
                    None => return StreamEnd::Closed,
                },
            }
        }
    }

    /// Connect, consume, and reconnect until shutdown or retries run out
    pub async fn run(
        &self,
        feed: FeedConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectionError> {
        let mut manager = ConnectionManager::new(feed);
        tracing::info!(url = %manager.url(), "Starting trade ingestion");

        let mut connection = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => return Ok(()),
            result = manager.connect() => result,
        };

        loop {
            match connection {
                Ok(stream) => match self.consume(stream, &mut shutdown).await {
                    StreamEnd::Shutdown => {
                        manager.mark_disconnected();
                        tracing::info!("Ingestion stopped");
                        return Ok(());
                    }
                    StreamEnd::Closed => tracing::warn!("Feed stream ended, reconnecting"),
                    StreamEnd::Failed(reason) => {
                        ErrorReporter::report_error(
                            &MonitorError::Connection(ConnectionError::ConnectionLost(reason)),
                            "ingest",
                        );
                    }
                },
                Err(e) => {
                    ErrorReporter::report_error(&MonitorError::Connection(e), "connect");
                }
            }

            manager.mark_disconnected();
            self.stats.reconnects.fetch_add(1, Ordering::Relaxed);

            connection = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => return Ok(()),
                result = manager.reconnect() => match result {
                    Err(e @ ConnectionError::RetriesExhausted(_)) => return Err(e),
                    other => other,
                },
            };
        }
    }
}

/// Resolves once shutdown is signalled or the sender is gone
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
