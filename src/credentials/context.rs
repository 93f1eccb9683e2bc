//! Credentials exposed by an ambient execution context (notebook, job runtime).

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use super::env::parse_bool;
use super::{CredentialError, CredentialProvider, CredentialRecord, SuccessLatch};

/// String-keyed configuration lookup offered by the surrounding runtime.
///
/// How the mapping is populated is the context's business.
#[cfg_attr(test, mockall::automock)]
pub trait ContextLookup: Send + Sync {
    /// Whether the context is reachable from this process. May be expensive.
    fn is_available(&self) -> bool;

    fn get(&self, key: &str) -> Option<String>;
}

/// A context backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MapContext {
    values: HashMap<String, String>,
}

impl MapContext {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ContextLookup for MapContext {
    fn is_available(&self) -> bool {
        !self.values.is_empty()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Keys under which the context publishes each credential field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKeys {
    pub host: String,
    pub token: String,
    pub username: String,
    pub password: String,
    pub insecure_tls: String,
}

impl Default for ContextKeys {
    fn default() -> Self {
        Self {
            host: "host".to_string(),
            token: "token".to_string(),
            username: "username".to_string(),
            password: "password".to_string(),
            insecure_tls: "shouldIgnoreTlsVerification".to_string(),
        }
    }
}

/// Reads credentials from a [`ContextLookup`].
///
/// The availability check runs until it first succeeds; after that the shared
/// [`SuccessLatch`] short-circuits it for every provider holding the latch.
pub struct ContextProvider<C: ContextLookup> {
    lookup: C,
    keys: ContextKeys,
    available_once: Arc<SuccessLatch>,
}

impl<C: ContextLookup> ContextProvider<C> {
    pub fn new(lookup: C, available_once: Arc<SuccessLatch>) -> Self {
        Self::with_keys(lookup, ContextKeys::default(), available_once)
    }

    pub fn with_keys(lookup: C, keys: ContextKeys, available_once: Arc<SuccessLatch>) -> Self {
        Self {
            lookup,
            keys,
            available_once,
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.lookup.get(key).filter(|v| !v.is_empty())
    }
}

impl<C: ContextLookup> CredentialProvider for ContextProvider<C> {
    fn name(&self) -> String {
        "context".to_string()
    }

    #[tracing::instrument(skip(self))]
    fn get_credentials(&self) -> Result<CredentialRecord, CredentialError> {
        if !self.available_once.is_set() {
            if !self.lookup.is_available() {
                return Err(CredentialError::Unavailable(
                    "execution context is not available".to_string(),
                ));
            }
            self.available_once.set();
        }

        let host = self
            .lookup(&self.keys.host)
            .ok_or_else(|| CredentialError::Missing(format!("context key '{}'", self.keys.host)))?;

        let insecure_tls = match self.lookup(&self.keys.insecure_tls) {
            Some(value) => parse_bool(&self.keys.insecure_tls, &value)?,
            None => false,
        };

        let mut record = CredentialRecord::new(host.trim_end_matches('/'))
            .with_username(self.lookup(&self.keys.username))
            .with_password(self.lookup(&self.keys.password))
            .with_insecure_tls(insecure_tls);
        if let Some(token) = self.lookup(&self.keys.token) {
            record = record.with_token(token);
        }
        Ok(record)
    }

    fn refresh(&self) {
        // Values are read live on every call; nothing to reload.
        debug!("Context credentials are read on demand");
    }
}
