//! HTTP client module with retry logic and error handling.

mod client;
mod error;
mod retry;
mod transport;

pub use client::RestClient;
pub use error::{HttpError, TransportError};
pub use retry::{CallOutcome, RetryPolicy, classify, is_retryable_status};
pub use transport::{
    Auth, HttpRequest, HttpResponse, Method, ReqwestTransport, TlsSettings, Transport,
};

#[cfg(test)]
pub use transport::MockTransport;
