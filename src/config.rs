//! Transport settings read from `QCFLOW_HTTP_REQUEST_*` variables.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::http::RetryPolicy;
use crate::runtime::{Runtime, optional_env};

pub const HTTP_REQUEST_MAX_RETRIES: &str = "QCFLOW_HTTP_REQUEST_MAX_RETRIES";
pub const HTTP_REQUEST_BACKOFF_FACTOR: &str = "QCFLOW_HTTP_REQUEST_BACKOFF_FACTOR";
pub const HTTP_REQUEST_BACKOFF_JITTER: &str = "QCFLOW_HTTP_REQUEST_BACKOFF_JITTER";
pub const HTTP_REQUEST_TIMEOUT: &str = "QCFLOW_HTTP_REQUEST_TIMEOUT";
pub const HTTP_REQUEST_RETRY_TIMEOUT: &str = "QCFLOW_HTTP_REQUEST_RETRY_TIMEOUT";

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_FACTOR: u64 = 2;
const DEFAULT_BACKOFF_JITTER: f64 = 1.0;
const DEFAULT_TIMEOUT: u64 = 120;
const DEFAULT_RETRY_TIMEOUT: u64 = 500;

const MAX_RETRIES_LIMIT: u32 = 10;
const MAX_BACKOFF_FACTOR_LIMIT: u64 = 120;

/// Everything the REST client needs besides credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub retry: RetryPolicy,
    /// Network timeout for a single attempt.
    pub request_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT)),
        }
    }
}

impl TransportConfig {
    /// Reads the configuration, falling back to defaults for unset variables.
    #[tracing::instrument(skip(runtime))]
    pub fn from_runtime(runtime: &dyn Runtime) -> Result<Self> {
        let max_retries: u32 = read(runtime, HTTP_REQUEST_MAX_RETRIES, DEFAULT_MAX_RETRIES)?;
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::Config(format!(
                "{} must be at most {}, got {}",
                HTTP_REQUEST_MAX_RETRIES, MAX_RETRIES_LIMIT, max_retries
            )));
        }

        let backoff_factor: u64 =
            read(runtime, HTTP_REQUEST_BACKOFF_FACTOR, DEFAULT_BACKOFF_FACTOR)?;
        if backoff_factor > MAX_BACKOFF_FACTOR_LIMIT {
            return Err(Error::Config(format!(
                "{} must be at most {}, got {}",
                HTTP_REQUEST_BACKOFF_FACTOR, MAX_BACKOFF_FACTOR_LIMIT, backoff_factor
            )));
        }

        let jitter: f64 = read(runtime, HTTP_REQUEST_BACKOFF_JITTER, DEFAULT_BACKOFF_JITTER)?;
        let jitter = Duration::try_from_secs_f64(jitter).map_err(|e| {
            Error::Config(format!(
                "{} must be a non-negative number of seconds, got {}: {}",
                HTTP_REQUEST_BACKOFF_JITTER, jitter, e
            ))
        })?;

        let timeout: u64 = read(runtime, HTTP_REQUEST_TIMEOUT, DEFAULT_TIMEOUT)?;
        let retry_timeout: u64 = read(runtime, HTTP_REQUEST_RETRY_TIMEOUT, DEFAULT_RETRY_TIMEOUT)?;

        let retry = RetryPolicy::new(
            max_retries + 1,
            Duration::from_secs(backoff_factor),
            Duration::from_secs(retry_timeout),
        )?
        .with_jitter(jitter);

        Ok(Self {
            retry,
            // 0 disables the per-attempt timeout
            request_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
        })
    }
}

fn read<T>(runtime: &dyn Runtime, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(runtime, key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            Error::Config(format!("Failed to convert {:?} for {}: {}", raw, key, e))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use std::collections::HashMap;

    fn runtime_with(vars: &[(&str, &str)]) -> MockRuntime {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut runtime = MockRuntime::new();
        runtime.expect_env_var().returning(move |key| {
            vars.get(key)
                .cloned()
                .ok_or(std::env::VarError::NotPresent)
        });
        runtime
    }

    #[test]
    fn test_defaults() {
        let config = TransportConfig::from_runtime(&runtime_with(&[])).unwrap();
        assert_eq!(config, TransportConfig::default());
        assert_eq!(config.retry.max_attempts(), 6);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_overrides() {
        let config = TransportConfig::from_runtime(&runtime_with(&[
            (HTTP_REQUEST_MAX_RETRIES, "2"),
            (HTTP_REQUEST_BACKOFF_FACTOR, "1"),
            (HTTP_REQUEST_BACKOFF_JITTER, "0.5"),
            (HTTP_REQUEST_TIMEOUT, "0"),
            (HTTP_REQUEST_RETRY_TIMEOUT, "30"),
        ]))
        .unwrap();

        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
        assert_eq!(config.retry.jitter(), Duration::from_millis(500));
        assert_eq!(config.retry.max_total_retry_duration(), Duration::from_secs(30));
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_unparseable_value_names_variable() {
        let err = TransportConfig::from_runtime(&runtime_with(&[(HTTP_REQUEST_MAX_RETRIES, "many")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(HTTP_REQUEST_MAX_RETRIES));
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_limits_enforced() {
        let err = TransportConfig::from_runtime(&runtime_with(&[(HTTP_REQUEST_MAX_RETRIES, "11")]))
            .unwrap_err();
        assert!(err.to_string().contains("at most 10"));

        let err =
            TransportConfig::from_runtime(&runtime_with(&[(HTTP_REQUEST_BACKOFF_FACTOR, "121")]))
                .unwrap_err();
        assert!(err.to_string().contains("at most 120"));
    }

    #[test]
    fn test_out_of_range_jitter_rejected() {
        for raw in ["-1", "1e30", "NaN", "inf"] {
            let err =
                TransportConfig::from_runtime(&runtime_with(&[(HTTP_REQUEST_BACKOFF_JITTER, raw)]))
                    .unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{}: {:?}", raw, err);
            assert!(err.to_string().contains(HTTP_REQUEST_BACKOFF_JITTER));
        }
    }
}
