//! Source configuration
//!
//! One TOML file describes one TAXII collection to ingest.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use stixpoll_core::{DecodeOptions, DEFAULT_CONFIDENCE_LEVELS};
use stixpoll_net::{ClientConfig, PollTarget};

use crate::scheduler::RunSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where the poll endpoint comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Resolved through a discovery service
    Discovery(String),
    /// Known poll service address
    Static(String),
}

/// Configuration of one ingestion source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Name used in logs
    #[serde(default = "default_name")]
    pub name: String,
    /// TAXII collection to poll
    pub collection: String,
    /// Discovery service address (exclusive with `poll_service`)
    #[serde(default)]
    pub discovery_service: Option<String>,
    /// Poll service address (exclusive with `discovery_service`)
    #[serde(default)]
    pub poll_service: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    #[serde(default)]
    pub proxy: Option<String>,

    /// Longest time span covered by one poll request
    #[serde(default = "default_day_secs")]
    pub max_window_secs: u64,
    /// How far back the first run starts
    #[serde(default = "default_day_secs")]
    pub initial_lookback_secs: u64,
    /// Truncate window bounds to whole minutes
    #[serde(default)]
    pub lower_timestamp_precision: bool,

    #[serde(default = "default_true")]
    pub ip_version_auto_detect: bool,
    #[serde(default = "default_confidence_map")]
    pub confidence_map: Option<HashMap<String, i64>>,
    /// Replacement for the `stix` attribute prefix
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_header: Option<String>,
}

fn default_name() -> String {
    "taxii".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

fn default_day_secs() -> u64 {
    86_400
}

fn default_confidence_map() -> Option<HashMap<String, i64>> {
    Some(
        DEFAULT_CONFIDENCE_LEVELS
            .iter()
            .map(|(level, score)| (level.to_string(), *score))
            .collect(),
    )
}

impl SourceConfig {
    /// A source with defaults for everything but the collection and endpoint
    pub fn new(collection: impl Into<String>, endpoint: Endpoint) -> Self {
        let (discovery_service, poll_service) = match endpoint {
            Endpoint::Discovery(url) => (Some(url), None),
            Endpoint::Static(url) => (None, Some(url)),
        };
        Self {
            name: default_name(),
            collection: collection.into(),
            discovery_service,
            poll_service,
            subscription_id: None,
            timeout_secs: default_timeout_secs(),
            verify_cert: true,
            proxy: None,
            max_window_secs: default_day_secs(),
            initial_lookback_secs: default_day_secs(),
            lower_timestamp_precision: false,
            ip_version_auto_detect: true,
            confidence_map: default_confidence_map(),
            prefix: None,
            username: None,
            password: None,
            api_key: None,
            api_header: None,
        }
    }

    /// Load and validate a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("collection must not be empty".into()));
        }
        match (&self.discovery_service, &self.poll_service) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "discovery_service and poll_service are mutually exclusive".into(),
                ))
            }
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "one of discovery_service or poll_service is required".into(),
                ))
            }
            _ => {}
        }
        if self.max_window_secs == 0 {
            return Err(ConfigError::Invalid("max_window_secs must be positive".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        self.validate()?;
        match (&self.discovery_service, &self.poll_service) {
            (Some(url), None) => Ok(Endpoint::Discovery(url.clone())),
            (None, Some(url)) => Ok(Endpoint::Static(url.clone())),
            _ => Err(ConfigError::Invalid("ambiguous endpoint".into())),
        }
    }

    /// Poll target once the poll endpoint is known
    pub fn poll_target(&self, endpoint: &str) -> PollTarget {
        let target = PollTarget::new(endpoint, &self.collection);
        match &self.subscription_id {
            Some(id) => target.with_subscription(id),
            None => target,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default().with_timeout(self.timeout_secs);
        config.verify_cert = self.verify_cert;
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy(proxy);
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            config = config.with_basic_auth(username, password);
        }
        if let (Some(header), Some(key)) = (&self.api_header, &self.api_key) {
            config = config.with_api_key(header, key);
        }
        config
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            ip_version_auto_detect: self.ip_version_auto_detect,
            confidence_map: self.confidence_map.as_ref().map(|map| {
                map.iter()
                    .map(|(level, score)| (level.to_lowercase(), *score))
                    .collect()
            }),
            attribute_prefix: self.prefix.clone(),
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            max_window: secs_to_millis(self.max_window_secs),
            initial_lookback: secs_to_millis(self.initial_lookback_secs),
            lower_precision: self.lower_timestamp_precision,
        }
    }
}

fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX / 1000).saturating_mul(1000)
}
