//! Z-score threshold alerts and their delivery channels
//!
//! Every refresh is evaluated on its own: there is no debouncing and no
//! memory of earlier alerts.

use crate::{engine::ScoreRow, error::ConfigError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Default `|z|` bound
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Upper bound on a single webhook delivery
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// A validated alert threshold (finite, > 0)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct AlertThreshold(f64);

impl AlertThreshold {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidThreshold(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for AlertThreshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl TryFrom<f64> for AlertThreshold {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AlertThreshold> for f64 {
    fn from(threshold: AlertThreshold) -> f64 {
        threshold.0
    }
}

impl fmt::Display for AlertThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Always show a decimal point: 2 -> "2.0"
        write!(f, "{:?}", self.0)
    }
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    /// `|z|` at least twice the threshold
    Critical,
}

/// A triggered z-score alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    /// Signed z-score of the latest row
    pub score: f64,
    pub threshold: f64,
    pub message: String,
    pub bucket_start: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    fn new(score: f64, threshold: AlertThreshold, bucket_start: DateTime<Utc>) -> Self {
        let severity = if score.abs() >= 2.0 * threshold.value() {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            severity,
            score,
            threshold: threshold.value(),
            message: format_message(score, threshold),
            bucket_start,
            timestamp: Utc::now(),
        }
    }
}

/// Alert text shown to the user
pub fn format_message(score: f64, threshold: AlertThreshold) -> String {
    format!("⚠️ ALERT: |Z|={:.2} crossed threshold {}", score.abs(), threshold)
}

/// Outcome of evaluating the latest score row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlertDecision {
    /// No score row at all
    NoData,
    /// The latest row has no defined z-score
    Undefined,
    Clear { score: f64 },
    Triggered(Alert),
}

impl AlertDecision {
    pub fn is_triggered(&self) -> bool {
        matches!(self, AlertDecision::Triggered(_))
    }

    pub fn alert(&self) -> Option<&Alert> {
        match self {
            AlertDecision::Triggered(alert) => Some(alert),
            _ => None,
        }
    }

    /// Alert text, empty when nothing triggered
    pub fn message(&self) -> &str {
        self.alert().map(|a| a.message.as_str()).unwrap_or("")
    }
}

/// Compares the latest z-score against the threshold (inclusive)
pub struct AlertEvaluator;

impl AlertEvaluator {
    pub fn evaluate(latest: Option<&ScoreRow>, threshold: AlertThreshold) -> AlertDecision {
        let Some(row) = latest else {
            return AlertDecision::NoData;
        };

        // Undefined scores never reach the comparison
        let Some(score) = row.zscore.filter(|z| z.is_finite()) else {
            return AlertDecision::Undefined;
        };

        if score.abs() >= threshold.value() {
            AlertDecision::Triggered(Alert::new(score, threshold, row.bucket_start))
        } else {
            AlertDecision::Clear { score }
        }
    }
}

/// Alert channel trait
#[async_trait::async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), String>;
    fn name(&self) -> &str;
}

/// Console alert channel (structured log event)
pub struct ConsoleChannel;

#[async_trait::async_trait]
impl AlertChannel for ConsoleChannel {
    async fn send(&self, alert: &Alert) -> Result<(), String> {
        tracing::warn!(
            alert_id = %alert.id,
            severity = ?alert.severity,
            score = alert.score,
            threshold = alert.threshold,
            "{}",
            alert.message
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Webhook alert channel (HTTP POST)
pub struct WebhookChannel {
    pub url: String,
    pub headers: HashMap<String, String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            headers: HashMap::new(),
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
            client: Self::build_client(DEFAULT_WEBHOOK_TIMEOUT),
        }
    }

    /// Bound each delivery, connect and response included
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = Self::build_client(timeout);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_client(timeout: Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build webhook client ({}), using defaults", e);
                reqwest::Client::new()
            })
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Discord/Slack compatible body
    fn payload(alert: &Alert) -> serde_json::Value {
        serde_json::json!({
            "content": alert.message,
            "text": alert.message,
            "embeds": [{
                "title": format!("{:?} z-score alert", alert.severity),
                "description": alert.message,
                "color": match alert.severity {
                    AlertSeverity::Warning => 16776960,  // Yellow
                    AlertSeverity::Critical => 15158332, // Red
                },
                "timestamp": alert.timestamp.to_rfc3339(),
            }],
            "alert": alert,
        })
    }
}

#[async_trait::async_trait]
impl AlertChannel for WebhookChannel {
    async fn send(&self, alert: &Alert) -> Result<(), String> {
        let mut request = self.client.post(&self.url).json(&Self::payload(alert));

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        // The client timeout can be lost if the builder fell back
        match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(format!("Webhook returned {}", response.status())),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("Webhook timed out after {:?}", self.timeout)),
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Fans a triggered alert out to every channel
pub struct AlertRouter {
    channels: Vec<Box<dyn AlertChannel>>,
    min_severity: AlertSeverity,
}

impl AlertRouter {
    pub fn new() -> Self {
        Self {
            channels: vec![Box::new(ConsoleChannel)],
            min_severity: AlertSeverity::Warning,
        }
    }

    pub fn add_channel(&mut self, channel: Box<dyn AlertChannel>) {
        self.channels.push(channel);
    }

    pub fn set_min_severity(&mut self, severity: AlertSeverity) {
        self.min_severity = severity;
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send to all channels; returns how many accepted it.
    /// Delivery failures are logged and otherwise ignored.
    pub async fn dispatch(&self, alert: &Alert) -> usize {
        if alert.severity < self.min_severity {
            return 0;
        }

        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(alert).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(channel = channel.name(), alert_id = %alert.id, "Failed to send alert: {}", e);
                }
            }
        }
        delivered
    }
}

impl Default for AlertRouter {
    fn default() -> Self {
        Self::new()
    }
}
