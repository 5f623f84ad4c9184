//! Error types for the spread monitor

use thiserror::Error;
use std::fmt;

/// Main error type for the monitor
#[derive(Error, Debug, Clone)]
pub enum MonitorError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Connection-specific errors
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("Failed to establish connection: {0}")]
    EstablishmentFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Reconnection attempts exhausted after {0} tries")]
    RetriesExhausted(u32),
}

/// Parsing-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Not a trade message: {0}")]
    NotATrade(String),
}

/// Configuration errors, rejected before they reach the pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid threshold {0}: must be finite and > 0")]
    InvalidThreshold(f64),

    #[error("Unrecognized comparison mode: {0}")]
    UnknownMode(String),

    #[error("Unrecognized granularity: {0}")]
    UnknownGranularity(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,      // Skipped frames, defaulted fields
    Medium,   // Recoverable errors
    High,     // Critical errors that affect functionality
    Critical, // The feed is gone for good
}

impl ErrorSeverity {
    pub fn from_error(error: &MonitorError) -> Self {
        match error {
            MonitorError::Configuration(_) => ErrorSeverity::High,
            MonitorError::Connection(conn_err) => match conn_err {
                ConnectionError::RetriesExhausted(_) => ErrorSeverity::Critical,
                ConnectionError::Timeout(_) | ConnectionError::ConnectionLost(_) => ErrorSeverity::Medium,
                ConnectionError::EstablishmentFailed(_) => ErrorSeverity::High,
            },
            MonitorError::Parse(_) => ErrorSeverity::Low,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorSeverity::Low => "LOW",
            ErrorSeverity::Medium => "MEDIUM",
            ErrorSeverity::High => "HIGH",
            ErrorSeverity::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// Error reporter for structured logging
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn report_error(error: &MonitorError, operation: &str) {
        let severity = ErrorSeverity::from_error(error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                tracing::error!(%severity, operation, "{}", error);
            }
            ErrorSeverity::Medium => {
                tracing::warn!(%severity, operation, "{}", error);
            }
            ErrorSeverity::Low => {
                tracing::debug!(%severity, operation, "{}", error);
            }
        }
    }
}
