//! HTTP failure types.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// A call the service refused, or one that ran out of retries.
///
/// `status` is `None` when no response arrived at all (connection refused,
/// timeout, reset), which separates "service said no" from network trouble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: Option<u16>,
    pub reason: String,
    pub body: Option<String>,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Set when the failure was retryable but the budget ran out.
    pub retries_exhausted: bool,
}

impl HttpError {
    pub fn from_status(status: u16, body: Option<String>, attempts: u32) -> Self {
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
            .to_string();
        Self {
            status: Some(status),
            reason,
            body,
            attempts,
            retries_exhausted: false,
        }
    }

    pub fn from_transport(error: &TransportError, attempts: u32) -> Self {
        Self {
            status: None,
            reason: error.to_string(),
            body: None,
            attempts,
            retries_exhausted: false,
        }
    }

    pub(crate) fn exhausted(mut self) -> Self {
        self.retries_exhausted = true;
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {} {}", status, self.reason)?,
            None => write!(f, "Request failed: {}", self.reason)?,
        }
        if self.retries_exhausted {
            write!(f, " (gave up after {} attempts)", self.attempts)?;
        }
        if let Some(body) = &self.body {
            write!(f, ". Response body: '{}'", body)?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// Failure below the HTTP layer, before any status was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The TLS material on the credential could not be loaded. Not retried.
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Tls(_))
    }
}
