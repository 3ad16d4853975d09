use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_API_BASE_URL: &str = "https://www.theyworkforyou.com/api/";
const DEFAULT_PROFILE_BASE_URL: &str = "https://www.theyworkforyou.com/mp/";
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 5000;
const DEFAULT_OVERRIDE_TTL_SECS: u64 = 600;
const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 3000;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Legislative API key is not configured")]
    MissingApiKey,

    #[error("No client credentials are configured")]
    NoClients,

    #[error("Empty client id")]
    EmptyClientId,

    #[error("Duplicate client id: {0}")]
    DuplicateClient(String),

    #[error("Timeout cannot be 0")]
    InvalidTimeout,
}

/// Service configuration. Built once at startup and passed by reference to
/// every component constructor.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the public lookup API
    #[serde(default)]
    pub listener: Listener,
    /// Listener for health and readiness probes
    #[serde(default = "Listener::admin_default")]
    pub admin_listener: Listener,
    pub legislative_api: LegislativeApi,
    pub overrides: Overrides,
    /// Callers allowed to use the API
    #[serde(default)]
    pub clients: Vec<ClientCredential>,
    #[serde(default)]
    pub event_sink: EventSink,
}

impl Config {
    /// Checks everything that would otherwise only fail mid-request.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.legislative_api.api_key.trim().is_empty() {
            return Err(ValidationError::MissingApiKey);
        }

        if self.legislative_api.timeout_ms == 0
            || self.overrides.timeout_ms == 0
            || self.event_sink.timeout_ms == 0
        {
            return Err(ValidationError::InvalidTimeout);
        }

        if self.clients.is_empty() {
            return Err(ValidationError::NoClients);
        }

        let mut client_ids = HashSet::new();
        for client in &self.clients {
            if client.id.is_empty() {
                return Err(ValidationError::EmptyClientId);
            }

            if !client_ids.insert(&client.id) {
                return Err(ValidationError::DuplicateClient(client.id.clone()));
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }

    fn admin_default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// The legislative-data API used to resolve postcodes.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LegislativeApi {
    #[serde(default = "default_api_base_url")]
    pub base_url: Url,
    /// Missing keys are reported by `Config::validate` rather than at parse time
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    /// Base of the public profile page; the person id is appended as `?p=<id>`
    #[serde(default = "default_profile_base_url")]
    pub profile_base_url: Url,
}

impl LegislativeApi {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The curated email override dataset.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Overrides {
    pub url: Url,
    #[serde(default = "default_override_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

impl Overrides {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClientCredential {
    pub id: String,
    pub token: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Optional webhook receiving one event per handled request.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EventSink {
    pub webhook_url: Option<Url>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

impl EventSink {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EventSink {
    fn default() -> Self {
        EventSink {
            webhook_url: None,
            timeout_ms: DEFAULT_WEBHOOK_TIMEOUT_MS,
        }
    }
}

fn default_api_base_url() -> Url {
    Url::parse(DEFAULT_API_BASE_URL).expect("default API base URL is valid")
}

fn default_profile_base_url() -> Url {
    Url::parse(DEFAULT_PROFILE_BASE_URL).expect("default profile base URL is valid")
}

fn default_upstream_timeout_ms() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_MS
}

fn default_override_ttl_secs() -> u64 {
    DEFAULT_OVERRIDE_TTL_SECS
}

fn default_webhook_timeout_ms() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_MS
}

fn default_active() -> bool {
    true
}
