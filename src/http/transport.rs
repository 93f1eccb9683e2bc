//! Single-attempt HTTP exchange, separated from the retry logic.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, Identity};

use super::TransportError;
use crate::credentials::{CredentialRecord, mask_secret};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            _ => anyhow::bail!("Unsupported method: {}. Expected GET or POST.", s),
        }
    }
}

/// Authentication applied to one request. At most one scheme per request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Bearer(String),
    Basic { username: String, password: String },
}

impl Auth {
    /// Picks the scheme for a credential: token first, then username/password.
    pub fn from_credentials(record: &CredentialRecord) -> Option<Auth> {
        if let Some(token) = record.token() {
            return Some(Auth::Bearer(token.to_string()));
        }
        match (record.username(), record.password()) {
            (Some(username), Some(password)) => Some(Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Bearer(token) => write!(f, "Bearer({})", mask_secret(token)),
            Auth::Basic { username, .. } => write!(f, "Basic({}:***)", username),
        }
    }
}

/// TLS knobs taken from the active credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TlsSettings {
    pub insecure: bool,
    pub server_cert_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
}

impl TlsSettings {
    pub fn from_credentials(record: &CredentialRecord) -> Self {
        Self {
            insecure: record.insecure_tls(),
            server_cert_path: record.server_cert_path().map(PathBuf::from),
            client_cert_path: record.client_cert_path().map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// JSON text, POST only.
    pub body: Option<String>,
    pub auth: Option<Auth>,
    pub tls: TlsSettings,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends one request and returns whatever status came back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport.
///
/// Certificate verification is a client-level setting in reqwest, so one
/// client is kept per distinct [`TlsSettings`]; an insecure credential never
/// affects requests made with a secure one.
pub struct ReqwestTransport {
    user_agent: String,
    clients: Mutex<HashMap<TlsSettings, Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::with_user_agent(format!(
            "qcflow-transport/{}",
            env!("QCFLOW_TRANSPORT_VERSION")
        ))
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, tls: &TlsSettings) -> Result<Client, TransportError> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(tls) {
            return Ok(client.clone());
        }

        let client = self.build_client(tls)?;
        clients.insert(tls.clone(), client.clone());
        Ok(client)
    }

    #[tracing::instrument(skip(self))]
    fn build_client(&self, tls: &TlsSettings) -> Result<Client, TransportError> {
        let mut builder = Client::builder().user_agent(&self.user_agent);

        if tls.insecure {
            debug!("Skipping TLS certificate verification");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(path) = &tls.server_cert_path {
            let pem = read_pem(path)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| TransportError::Tls(format!("{}: {}", path.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(path) = &tls.client_cert_path {
            let pem = read_pem(path)?;
            let identity = Identity::from_pem(&pem)
                .map_err(|e| TransportError::Tls(format!("{}: {}", path.display(), e)))?;
            builder = builder.identity(identity);
        }

        builder
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|e| TransportError::Tls(format!("{}: {}", path.display(), e)))
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.client_for(&request.tls)?;

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match &request.auth {
            Some(Auth::Bearer(token)) => builder.bearer_auth(token),
            Some(Auth::Basic { username, password }) => builder.basic_auth(username, Some(password)),
            None => builder,
        };
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        debug!("{} {} -> {} ({} bytes)", request.method, request.url, status, body.len());

        Ok(HttpResponse { status, body })
    }
}
