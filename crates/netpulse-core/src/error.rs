// Error types for the measurement engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while configuring or running a monitoring session
///
/// Only [`MonitorError::InvalidConfig`] ever reaches a caller of the session
/// controller. Probe and sample failures are converted into log records at the
/// operation boundary, and [`MonitorError::Cancelled`] is dropped silently.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Session configuration rejected at start
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Latency probe failed
    #[error("Probe failed: {0}")]
    Probe(String),

    /// Throughput sample failed
    #[error("Sample failed: {0}")]
    Sample(String),

    /// Sample was cancelled by a session stop
    #[error("Sample cancelled")]
    Cancelled,

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    /// Target URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl MonitorError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        MonitorError::InvalidConfig(msg.into())
    }

    /// Create a probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        MonitorError::Probe(msg.into())
    }

    /// Create a sample error
    pub fn sample(msg: impl Into<String>) -> Self {
        MonitorError::Sample(msg.into())
    }

    /// Whether this error is the expected result of a stop
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MonitorError::Cancelled)
    }
}
