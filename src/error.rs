//! Crate-level error type.
//!
//! Every failure a caller can observe from a transport call is one of the
//! variants below, so workflow code can match on the failure kind instead of
//! inspecting low-level transport errors.

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::http::HttpError;
use crate::wire::DeserializationError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// No provider produced usable credentials. Never retried.
    #[error("Credential resolution failed: {0}")]
    CredentialResolution(#[from] CredentialError),

    /// The server rejected the request, or retries ran out.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A wire payload did not parse or did not fit the expected shape.
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    /// A caller record could not be represented as JSON.
    #[error("Failed to serialize request payload: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Invalid transport configuration, detected at construction time.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(e) => e.status,
            _ => None,
        }
    }
}
