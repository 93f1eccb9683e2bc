//! Credentials from the process environment and `~/.qcflow/credentials`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use log::{debug, warn};

use super::{CredentialError, CredentialProvider, CredentialRecord, mask_secret};
use crate::runtime::{Runtime, optional_env};

pub const TRACKING_URI: &str = "QCFLOW_TRACKING_URI";
pub const TRACKING_USERNAME: &str = "QCFLOW_TRACKING_USERNAME";
pub const TRACKING_PASSWORD: &str = "QCFLOW_TRACKING_PASSWORD";
pub const TRACKING_TOKEN: &str = "QCFLOW_TRACKING_TOKEN";
pub const TRACKING_INSECURE_TLS: &str = "QCFLOW_TRACKING_INSECURE_TLS";
pub const TRACKING_SERVER_CERT_PATH: &str = "QCFLOW_TRACKING_SERVER_CERT_PATH";
pub const TRACKING_CLIENT_CERT_PATH: &str = "QCFLOW_TRACKING_CLIENT_CERT_PATH";

/// Section of the credentials file holding the tracking login.
pub const CREDENTIALS_FILE_SECTION: &str = "qcflow";

/// Builds credentials from `QCFLOW_TRACKING_*` variables.
///
/// Username and password fall back to the `[qcflow]` section of
/// `~/.qcflow/credentials`; the environment wins per field. The last good
/// record is cached until [`CredentialProvider::refresh`] is called.
pub struct EnvironmentProvider<R: Runtime> {
    runtime: R,
    cached: RwLock<Option<CredentialRecord>>,
}

impl<R: Runtime> EnvironmentProvider<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            cached: RwLock::new(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn load(&self) -> Result<CredentialRecord, CredentialError> {
        let uri = optional_env(&self.runtime, TRACKING_URI)
            .ok_or_else(|| CredentialError::Missing(TRACKING_URI.to_string()))?;
        let host = normalize_host(&uri)?;

        let (file_username, file_password) = self.read_credentials_file();
        let username = optional_env(&self.runtime, TRACKING_USERNAME).or(file_username);
        let password = optional_env(&self.runtime, TRACKING_PASSWORD).or(file_password);

        let insecure_tls = match optional_env(&self.runtime, TRACKING_INSECURE_TLS) {
            Some(value) => parse_bool(TRACKING_INSECURE_TLS, &value)?,
            None => false,
        };

        let server_cert_path =
            optional_env(&self.runtime, TRACKING_SERVER_CERT_PATH).map(PathBuf::from);
        let client_cert_path =
            optional_env(&self.runtime, TRACKING_CLIENT_CERT_PATH).map(PathBuf::from);

        if insecure_tls && server_cert_path.is_some() {
            return Err(CredentialError::Invalid {
                key: TRACKING_INSECURE_TLS.to_string(),
                reason: format!("cannot be combined with {}", TRACKING_SERVER_CERT_PATH),
            });
        }

        let mut record = CredentialRecord::new(host)
            .with_username(username)
            .with_password(password)
            .with_insecure_tls(insecure_tls)
            .with_server_cert_path(server_cert_path)
            .with_client_cert_path(client_cert_path);

        if let Some(token) = optional_env(&self.runtime, TRACKING_TOKEN) {
            debug!("Using {} for authentication: {}", TRACKING_TOKEN, mask_secret(&token));
            record = record.with_token(token);
        }

        Ok(record)
    }

    /// Reads username and password from the credentials file, if any.
    fn read_credentials_file(&self) -> (Option<String>, Option<String>) {
        let Some(home) = self.runtime.home_dir() else {
            return (None, None);
        };
        let path = home.join(".qcflow").join("credentials");
        if !self.runtime.exists(&path) {
            return (None, None);
        }

        let contents = match self.runtime.read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Ignoring unreadable credentials file: {:#}", e);
                return (None, None);
            }
        };

        let mut section = parse_ini_section(&contents, CREDENTIALS_FILE_SECTION);
        (
            section.remove(&TRACKING_USERNAME.to_lowercase()),
            section.remove(&TRACKING_PASSWORD.to_lowercase()),
        )
    }

    fn store(&self, record: Option<CredentialRecord>) {
        let mut cached = self.cached.write().unwrap_or_else(|e| e.into_inner());
        *cached = record;
    }
}

impl<R: Runtime> CredentialProvider for EnvironmentProvider<R> {
    fn name(&self) -> String {
        "environment".to_string()
    }

    fn get_credentials(&self) -> Result<CredentialRecord, CredentialError> {
        {
            let cached = self.cached.read().unwrap_or_else(|e| e.into_inner());
            if let Some(record) = cached.as_ref() {
                return Ok(record.clone());
            }
        }

        let record = self.load()?;
        self.store(Some(record.clone()));
        Ok(record)
    }

    fn refresh(&self) {
        match self.load() {
            Ok(record) => self.store(Some(record)),
            Err(e) => {
                debug!("Environment credentials unavailable after refresh: {}", e);
                self.store(None);
            }
        }
    }
}

/// Trims the trailing slash and rejects tracking URIs that are not HTTP(S).
fn normalize_host(uri: &str) -> Result<String, CredentialError> {
    let uri = uri.trim();
    if !(uri.starts_with("http://") || uri.starts_with("https://")) {
        return Err(CredentialError::Invalid {
            key: TRACKING_URI.to_string(),
            reason: format!("'{}' is not an http:// or https:// URI", uri),
        });
    }
    Ok(uri.trim_end_matches('/').to_string())
}

/// Parses a boolean setting. Accepts `true`, `false`, `1`, `0`, ignoring case.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, CredentialError> {
    match value.to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(CredentialError::Invalid {
            key: key.to_string(),
            reason: format!(
                "value must be one of ['true', 'false', '1', '0'] (case-insensitive), but got {}",
                value
            ),
        }),
    }
}

/// Extracts `key = value` (or `key: value`) pairs from one INI section.
/// Keys are lowercased.
fn parse_ini_section(contents: &str, wanted: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut in_section = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim() == wanted;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once(['=', ':']) {
            values.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    values
}
