//! HTTP transport for TAXII exchanges
//!
//! Wraps a reqwest client configured with the source's timeout, TLS
//! verification, proxy and credentials.

use reqwest::{Client, Proxy, Response, Url};
use std::fmt;
use std::time::Duration;
use stixpoll_core::Element;
use tracing::debug;

use crate::messages::{self, check_status};
use crate::TaxiiError;

/// Credentials attached to every request
#[derive(Clone, Default)]
pub struct Credentials {
    /// HTTP basic auth `(username, password)`
    pub basic: Option<(String, String)>,
    /// API key `(header name, key)`
    pub api_key: Option<(String, String)>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("basic", &self.basic.as_ref().map(|(user, _)| user))
            .field("api_key", &self.api_key.as_ref().map(|(header, _)| header))
            .finish()
    }
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Verify the server's TLS certificate
    pub verify_cert: bool,
    /// Optional proxy URL (http, https or socks5)
    pub proxy: Option<String>,
    pub credentials: Credentials,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            verify_cert: true,
            proxy: None,
            credentials: Credentials::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials.basic = Some((username.into(), password.into()));
        self
    }

    pub fn with_api_key(mut self, header: impl Into<String>, key: impl Into<String>) -> Self {
        self.credentials.api_key = Some((header.into(), key.into()));
        self
    }
}

/// A TAXII 1.1 client; cheap to clone
#[derive(Debug, Clone)]
pub struct TaxiiClient {
    http: Client,
    credentials: Credentials,
}

impl TaxiiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, TaxiiError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_cert);

        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy).map_err(|e| TaxiiError::ClientBuild(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| TaxiiError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            credentials: config.credentials.clone(),
        })
    }

    /// Send a TAXII message and hand back the response once its status is
    /// known to be successful; the body is left unread
    pub async fn post(&self, url: &str, body: String) -> Result<Response, TaxiiError> {
        let parsed = Url::parse(url).map_err(|e| TaxiiError::InvalidUrl(format!("{}: {}", url, e)))?;

        let mut request = self.http.post(parsed).body(body);
        for (name, value) in messages::headers(url) {
            request = request.header(name, value);
        }
        if let Some((username, password)) = &self.credentials.basic {
            request = request.basic_auth(username, Some(password));
        }
        if let Some((header, key)) = &self.credentials.api_key {
            request = request.header(header.as_str(), key.as_str());
        }

        debug!("POST {}", url);
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(TaxiiError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Request/response exchange for small, fully buffered responses
    pub async fn exchange(&self, url: &str, body: String) -> Result<Element, TaxiiError> {
        let text = self.post(url, body).await?.text().await?;
        let root = Element::parse(&text)?;
        check_status(&root)?;
        Ok(root)
    }
}
