//! Credential discovery for the tracking service.
//!
//! A [`CredentialProvider`] produces a [`CredentialRecord`] describing which
//! host to talk to and how to authenticate. Several variants exist (static,
//! environment-derived, context-derived), and a [`ChainProvider`] tries them
//! in priority order.

mod chain;
mod context;
mod env;
mod latch;
mod static_provider;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use chain::ChainProvider;
pub use context::{ContextKeys, ContextLookup, ContextProvider, MapContext};
pub use env::{
    CREDENTIALS_FILE_SECTION, EnvironmentProvider, TRACKING_CLIENT_CERT_PATH,
    TRACKING_INSECURE_TLS, TRACKING_PASSWORD, TRACKING_SERVER_CERT_PATH, TRACKING_TOKEN,
    TRACKING_URI, TRACKING_USERNAME, parse_bool,
};
pub use latch::SuccessLatch;
pub use static_provider::StaticProvider;

#[cfg(test)]
pub use context::MockContextLookup;

/// Immutable snapshot of a host and the material needed to authenticate to it.
///
/// Records are never edited in place; a refreshed credential is a new record.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct CredentialRecord {
    host: String,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    insecure_tls: bool,
    server_cert_path: Option<PathBuf>,
    client_cert_path: Option<PathBuf>,
}

impl CredentialRecord {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_insecure_tls(mut self, insecure_tls: bool) -> Self {
        self.insecure_tls = insecure_tls;
        self
    }

    pub fn with_server_cert_path(mut self, path: Option<PathBuf>) -> Self {
        self.server_cert_path = path;
        self
    }

    pub fn with_client_cert_path(mut self, path: Option<PathBuf>) -> Self {
        self.client_cert_path = path;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn insecure_tls(&self) -> bool {
        self.insecure_tls
    }

    pub fn server_cert_path(&self) -> Option<&Path> {
        self.server_cert_path.as_deref()
    }

    pub fn client_cert_path(&self) -> Option<&Path> {
        self.client_cert_path.as_deref()
    }

    /// A record is usable iff it names a host.
    pub fn is_usable(&self) -> bool {
        !self.host.is_empty()
    }

    /// Renders the record as environment variables for a subprocess.
    ///
    /// The variable names belong to the consumer; absent fields are omitted
    /// and the insecure flag is only emitted when set.
    pub fn to_env_vars(&self, names: &EnvVarNames) -> Vec<(String, String)> {
        let mut vars = vec![(names.host.clone(), self.host.clone())];
        if let Some(username) = &self.username {
            vars.push((names.username.clone(), username.clone()));
        }
        if let Some(password) = &self.password {
            vars.push((names.password.clone(), password.clone()));
        }
        if let Some(token) = &self.token {
            vars.push((names.token.clone(), token.clone()));
        }
        if self.insecure_tls {
            vars.push((names.insecure_tls.clone(), "true".to_string()));
        }
        vars
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_deref().map(mask_secret))
            .field("insecure_tls", &self.insecure_tls)
            .field("server_cert_path", &self.server_cert_path)
            .field("client_cert_path", &self.client_cert_path)
            .finish()
    }
}

/// Keeps the first four characters of a secret for log correlation.
pub(crate) fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}*********", prefix)
}

/// Environment variable names a subprocess expects the credentials under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarNames {
    pub host: String,
    pub username: String,
    pub password: String,
    pub token: String,
    pub insecure_tls: String,
}

/// Why a single provider failed, tagged with the provider's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.provider, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// A required setting is absent.
    #[error("{0} is not set")]
    Missing(String),

    /// A setting is present but unusable.
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// The backing source cannot be consulted right now.
    #[error("{0}")]
    Unavailable(String),

    /// Every provider in a chain failed.
    #[error("No usable tracking credentials found: {}", join_failures(.failures))]
    Exhausted { failures: Vec<ProviderFailure> },
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A source of tracking credentials.
///
/// Implementations must be safe to call from several threads at once; any
/// cached state is the provider's to synchronize.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    /// Short identifier used in diagnostics.
    fn name(&self) -> String;

    /// Resolve the current credentials.
    fn get_credentials(&self) -> Result<CredentialRecord, CredentialError>;

    /// Best-effort reload of whatever the provider reads. Never fails visibly.
    fn refresh(&self);
}
