use thiserror::Error;

/// Errors raised by the trading core
#[derive(Debug, Error)]
pub enum Error {
    /// Precondition violation: raised to the caller, never retried
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Failures coming out of a tick stream
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    /// Noise on the stream (unparseable non-tick line, momentary hiccup).
    /// Logged and skipped.
    #[error("transient stream error: {0}")]
    Transient(String),

    /// Session-level failure from the broker connection. Fatal to the worker.
    #[error("stream protocol error: {0}")]
    Protocol(String),
}

impl StreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StreamError::Transient(_))
    }
}

/// Failures reported by an order gateway
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
