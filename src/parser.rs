//! Trade message parsing with fault-tolerant field extraction
//!
//! Missing or malformed fields never abort the stream: the price falls back
//! to `0.0` and the event time to the receive time. Only frames that cannot
//! be attributed to a tracked symbol are rejected.

use crate::{
    data::{SymbolId, SymbolPair, Tick},
    error::ParseError,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Fallback price for a missing or unparseable `p` field
pub const DEFAULT_PRICE: f64 = 0.0;

/// A field value together with whether its fallback was used
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extracted<T> {
    Present(T),
    Defaulted(T),
}

impl<T> Extracted<T> {
    pub fn value(self) -> T {
        match self {
            Extracted::Present(v) | Extracted::Defaulted(v) => v,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Extracted::Defaulted(_))
    }
}

/// A tick plus which of its fields were defaulted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedTick {
    pub tick: Tick,
    pub price_defaulted: bool,
    pub timestamp_defaulted: bool,
}

/// Trait for turning raw feed frames into ticks
pub trait TradeParser: Send + Sync {
    /// Parse one text frame; `received_at` stands in for a missing event time
    fn parse_trade(&self, data: &str, received_at: DateTime<Utc>) -> Result<ParsedTick, ParseError>;
}

/// Parser for Binance `<symbol>@trade` frames, with or without the
/// combined-stream envelope
pub struct BinanceTradeParser {
    symbols: SymbolPair,
}

impl BinanceTradeParser {
    pub fn new(symbols: SymbolPair) -> Self {
        Self { symbols }
    }

    pub fn symbols(&self) -> &SymbolPair {
        &self.symbols
    }

    /// Numeric field given either as a JSON number or a numeric string
    fn extract_f64(obj: &Value, field: &str) -> Option<f64> {
        let value = match obj.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    fn extract_price(obj: &Value) -> Extracted<f64> {
        match Self::extract_f64(obj, "p") {
            Some(price) => Extracted::Present(price),
            None => Extracted::Defaulted(DEFAULT_PRICE),
        }
    }

    /// Trade time in ms since epoch, falling back to `received_at`
    fn extract_timestamp(obj: &Value, received_at: DateTime<Utc>) -> Extracted<DateTime<Utc>> {
        Self::extract_f64(obj, "T")
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
            .map(Extracted::Present)
            .unwrap_or(Extracted::Defaulted(received_at))
    }

    fn resolve_symbol(&self, stream: Option<&str>, payload: &Value) -> Result<SymbolId, ParseError> {
        if let Some(id) = stream.and_then(|s| self.symbols.resolve_stream(s)) {
            return Ok(id);
        }

        let symbol = payload.get("s").and_then(Value::as_str);
        if let Some(id) = symbol.and_then(|s| self.symbols.resolve(s)) {
            return Ok(id);
        }

        let seen = stream.or(symbol).unwrap_or("<missing>");
        Err(ParseError::UnknownSymbol(seen.to_string()))
    }
}

impl TradeParser for BinanceTradeParser {
    fn parse_trade(&self, data: &str, received_at: DateTime<Utc>) -> Result<ParsedTick, ParseError> {
        let json: Value = serde_json::from_str(data.trim())
            .map_err(|e| ParseError::InvalidJson(e.to_string()))?;

        if !json.is_object() {
            return Err(ParseError::NotATrade("frame is not a JSON object".to_string()));
        }

        // Subscription acks look like {"result": null, "id": 1}
        if json.get("result").is_some() && json.get("data").is_none() {
            return Err(ParseError::NotATrade("subscription response".to_string()));
        }

        let stream = json.get("stream").and_then(Value::as_str);
        let payload = json.get("data").filter(|d| d.is_object()).unwrap_or(&json);

        if let Some(event) = payload.get("e").and_then(Value::as_str) {
            if event != "trade" && event != "aggTrade" {
                return Err(ParseError::NotATrade(format!("event type {}", event)));
            }
        }

        let symbol = self.resolve_symbol(stream, payload)?;
        let price = Self::extract_price(payload);
        let timestamp = Self::extract_timestamp(payload, received_at);

        if price.is_defaulted() {
            tracing::warn!(%symbol, "Trade without usable price, defaulting to {}", DEFAULT_PRICE);
        }
        if timestamp.is_defaulted() {
            tracing::debug!(%symbol, "Trade without usable event time, using receive time");
        }

        Ok(ParsedTick {
            price_defaulted: price.is_defaulted(),
            timestamp_defaulted: timestamp.is_defaulted(),
            tick: Tick::new(symbol, price.value(), timestamp.value()),
        })
    }
}
