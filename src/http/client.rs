//! REST client with credential resolution and retry/backoff.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::retry::{CallOutcome, RetryPolicy, classify};
use super::transport::{
    Auth, HttpRequest, Method, ReqwestTransport, TlsSettings, Transport,
};
use super::HttpError;
use crate::config::TransportConfig;
use crate::credentials::{CredentialProvider, CredentialRecord};
use crate::error::{Error, Result};
use crate::wire::{self, DeserializationError, WireShape};

/// Issues GET/POST calls against the tracking service.
///
/// Credentials are re-resolved before every attempt, so a refresh between
/// attempts is picked up on the next try. The client holds no per-call state
/// and can be shared across tasks.
#[derive(Clone)]
pub struct RestClient {
    provider: Arc<dyn CredentialProvider>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    request_timeout: Option<Duration>,
}

impl RestClient {
    /// Creates a client backed by `reqwest`.
    pub fn new(provider: Arc<dyn CredentialProvider>, config: TransportConfig) -> Self {
        Self::with_transport(provider, Arc::new(ReqwestTransport::new()), config)
    }

    pub fn with_transport(
        provider: Arc<dyn CredentialProvider>,
        transport: Arc<dyn Transport>,
        config: TransportConfig,
    ) -> Self {
        Self {
            provider,
            transport,
            policy: config.retry,
            request_timeout: config.request_timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends a GET. `query` is a wire JSON object whose fields become
    /// query parameters.
    pub async fn get(&self, path: &str, query: Option<&str>) -> Result<Vec<u8>> {
        self.call(Method::Get, path, query).await
    }

    /// Sends a POST with a wire JSON body.
    pub async fn post(&self, path: &str, body: Option<&str>) -> Result<Vec<u8>> {
        self.call(Method::Post, path, body).await
    }

    /// Serializes `request`, calls the endpoint and deserializes the reply.
    pub async fn call_endpoint<Req, Resp>(
        &self,
        method: Method,
        path: &str,
        request: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + WireShape,
        Resp: DeserializeOwned + WireShape,
    {
        let payload = wire::to_wire(request)?;
        let body = self.call(method, path, Some(&payload)).await?;
        let text = String::from_utf8_lossy(&body);
        wire::from_wire(&text)
    }

    /// Performs one logical call, retrying transient failures.
    ///
    /// `body` is wire JSON text: sent as the request body for POST and
    /// flattened into the query string for GET. Returns the raw response body
    /// of the first 2xx answer.
    #[tracing::instrument(skip(self, body))]
    pub async fn call(&self, method: Method, path: &str, body: Option<&str>) -> Result<Vec<u8>> {
        let query = match (method, body) {
            (Method::Get, Some(body)) => query_params(body)?,
            _ => Vec::new(),
        };
        let body = match method {
            Method::Post => body.map(str::to_string),
            Method::Get => None,
        };

        let mut attempt: u32 = 0;
        let mut slept = Duration::ZERO;

        loop {
            attempt += 1;

            // Not retried: an exhausted chain will not recover by waiting.
            let credentials = self.provider.get_credentials()?;
            let request = self.build_request(method, path, &credentials, &query, body.clone());

            debug!("{} {} (attempt {}/{})", method, request.url, attempt, self.policy.max_attempts());

            let error = match self.attempt(request, attempt).await {
                CallOutcome::Success(bytes) => return Ok(bytes),
                CallOutcome::Fatal(error) => {
                    debug!("{} {}: non-retryable failure: {}", method, path, error);
                    return Err(Error::Http(error));
                }
                CallOutcome::Retryable(error) => error,
            };

            let Some(delay) = self.policy.next_delay(attempt, slept) else {
                warn!(
                    "{} {}: giving up after {} attempts ({:?} spent waiting): {}",
                    method, path, attempt, slept, error
                );
                return Err(Error::Http(error.exhausted()));
            };

            warn!(
                "{} {}: attempt {}/{} failed ({}), retrying in {}ms...",
                method,
                path,
                attempt,
                self.policy.max_attempts(),
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            slept += delay;
        }
    }

    async fn attempt(&self, request: HttpRequest, attempt: u32) -> CallOutcome {
        match self.transport.send(request).await {
            Ok(response) => classify(response.status, response.body, attempt),
            Err(e) if e.is_retryable() => {
                CallOutcome::Retryable(HttpError::from_transport(&e, attempt))
            }
            Err(e) => CallOutcome::Fatal(HttpError::from_transport(&e, attempt)),
        }
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        credentials: &CredentialRecord,
        query: &[(String, String)],
        body: Option<String>,
    ) -> HttpRequest {
        HttpRequest {
            method,
            url: join_url(credentials.host(), path),
            query: query.to_vec(),
            body,
            auth: Auth::from_credentials(credentials),
            tls: TlsSettings::from_credentials(credentials),
            timeout: self.request_timeout,
        }
    }
}

fn join_url(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", host, path)
    } else {
        format!("{}/{}", host, path)
    }
}

/// Flattens a wire JSON object into query parameters.
///
/// Arrays repeat the key, nested objects are sent as JSON text, nulls are
/// skipped. Anything other than an object is rejected.
fn query_params(text: &str) -> Result<Vec<(String, String)>> {
    let Value::Object(map) = wire::parse(text)? else {
        return Err(Error::Deserialization(DeserializationError {
            raw: text.to_string(),
            source: serde::de::Error::custom("GET payload must be a JSON object"),
        }));
    };

    let mut params = Vec::new();
    for (key, value) in &map {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item) {
                        params.push((key.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    params.push((key.clone(), text));
                }
            }
        }
    }
    Ok(params)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
