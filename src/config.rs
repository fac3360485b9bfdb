//! Configuration management for Hookgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{HookgateError, Result};

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "HOOKGATE";

/// Main configuration for the Hookgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Webhook provider secrets
    #[serde(default)]
    pub webhooks: WebhookConfig,

    /// Status relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum attempts per identifier per UTC day
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Number of days a bucket is kept before the sweep removes it
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Interval between retention sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_daily_limit() -> u32 {
    10
}

fn default_retention_days() -> u32 {
    7
}

fn default_sweep_interval() -> u64 {
    3600
}

impl RateLimitingConfig {
    /// Get the sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Webhook provider secrets.
///
/// Unset secrets make the corresponding webhook answer 500.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Lemon Squeezy signing secret
    #[serde(default)]
    pub lemon_squeezy_secret: Option<String>,

    /// Clerk (Svix) signing secret, usually prefixed with `whsec_`
    #[serde(default)]
    pub clerk_secret: Option<String>,
}

/// Status relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Full URL of the `/rate-limit-status` endpoint the relay queries
    #[serde(default)]
    pub status_url: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_relay_timeout")]
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            status_url: None,
            timeout_ms: default_relay_timeout(),
        }
    }
}

fn default_relay_timeout() -> u64 {
    5000
}

impl RelayConfig {
    /// Get the request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl HookgateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| HookgateError::Config(e.to_string()))
    }

    /// Load layered configuration: defaults, then an optional YAML file,
    /// then `HOOKGATE__SECTION__KEY` environment variables.
    ///
    /// The provider-native `LEMON_SQUEEZY_WEBHOOK_SECRET` and
    /// `CLERK_WEBHOOK_SECRET` variables fill secrets still unset afterwards.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&base)?)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: HookgateConfig = settings.try_deserialize()?;
        config.fill_provider_secrets();
        config.validate()?;
        Ok(config)
    }

    fn fill_provider_secrets(&mut self) {
        if self.webhooks.lemon_squeezy_secret.is_none() {
            self.webhooks.lemon_squeezy_secret = std::env::var("LEMON_SQUEEZY_WEBHOOK_SECRET").ok();
        }
        if self.webhooks.clerk_secret.is_none() {
            self.webhooks.clerk_secret = std::env::var("CLERK_WEBHOOK_SECRET").ok();
        }
    }

    /// Reject settings the limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.daily_limit == 0 {
            return Err(HookgateError::Config(
                "rate_limiting.daily_limit must be at least 1".to_string(),
            ));
        }
        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(HookgateError::Config(
                "rate_limiting.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
