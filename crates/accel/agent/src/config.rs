//! Configuration for the accelerator agent

use accel_types::{AuthSession, ServiceKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Host name; also the name of the host's resource provider
    #[serde(default = "default_host")]
    pub host: String,

    /// Periodic task configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Remote service configuration
    #[serde(default)]
    pub services: ServicesConfig,

    /// Pre-provisioned credentials and endpoints
    #[serde(default)]
    pub auth: AuthConfig,

    /// Hardware discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            scheduler: SchedulerConfig::default(),
            services: ServicesConfig::default(),
            auth: AuthConfig::default(),
            discovery: DiscoveryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Reconciliation interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Run once at startup instead of waiting a full interval
    #[serde(default = "default_true")]
    pub run_immediately: bool,

    /// Stop the loop on the first failed run
    #[serde(default)]
    pub raise_on_error: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            run_immediately: true,
            raise_on_error: false,
        }
    }
}

/// Remote services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the inventory service
    #[serde(default = "default_inventory_url")]
    pub inventory_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            inventory_url: default_inventory_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Credentials for the image catalog and placement service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub placement_url: Option<String>,
}

impl AuthConfig {
    /// Session built from the configured token, if any
    pub fn session(&self) -> Option<AuthSession> {
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        let mut session = AuthSession::new(token);
        if let Some(url) = &self.image_url {
            session = session.with_endpoint(ServiceKind::Image, url.as_str());
        }
        if let Some(url) = &self.placement_url {
            session = session.with_endpoint(ServiceKind::Placement, url.as_str());
        }
        Some(session)
    }
}

/// Hardware discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// JSON file describing the host's accelerator devices per vendor
    #[serde(default = "default_inventory_path")]
    pub inventory_path: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            inventory_path: default_inventory_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    60
}

fn default_inventory_url() -> String {
    "http://127.0.0.1:6666".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_inventory_path() -> PathBuf {
    PathBuf::from("/etc/accel/devices.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AgentConfig {
    /// Load configuration: defaults, then the optional file, then `ACCEL_*` env vars
    ///
    /// Nested keys use `__`, e.g. `ACCEL_SCHEDULER__INTERVAL_SECS=30`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&AgentConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with ACCEL_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("ACCEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
