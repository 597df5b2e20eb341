//! Configuration management for vitalsync.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::channel::ReconnectPolicy;
use crate::error::{Error, Result};
use crate::store::StoreLimits;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "vitalsync";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `VITALSYNC_`)
/// 2. TOML config file at `~/.config/vitalsync/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint configuration.
    pub endpoint: EndpointConfig,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Aggregation bounds.
    pub limits: LimitsConfig,
}

/// Endpoint-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Host (and optional port) serving the streaming endpoints.
    pub host: String,
    /// Use TLS (`wss://`) when connecting.
    pub secure: bool,
}

/// Reconnection-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff cap, in milliseconds.
    pub cap_delay_ms: u64,
    /// Maximum automatic reconnect attempts before giving up.
    pub max_attempts: u32,
}

/// Aggregation bounds for the live state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of retained radar frames.
    pub frame_capacity: usize,
    /// Maximum number of retained point-cloud points.
    pub point_capacity: usize,
    /// Update cycles after which an unrefreshed point is evicted.
    pub point_max_age: u32,
    /// Wall-clock span of retained vitals history, in seconds.
    pub vitals_retention_secs: u64,
    /// Maximum number of retained sensor log lines.
    pub log_capacity: usize,
    /// Initial UI time-window selection, in seconds.
    pub time_window_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:8080".to_string(),
            secure: false,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            cap_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            frame_capacity: 200,
            point_capacity: 500,
            point_max_age: 15,
            vitals_retention_secs: 300,
            log_capacity: 1000,
            time_window_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `VITALSYNC_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("VITALSYNC_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "endpoint host must not be empty".to_string(),
            });
        }

        // The scheme comes from the `secure` flag, never from the host.
        if self.endpoint.host.contains("://") {
            return Err(Error::ConfigValidation {
                message: format!(
                    "endpoint host '{}' must not include a scheme",
                    self.endpoint.host
                ),
            });
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "base_delay_ms must be greater than 0".to_string(),
            });
        }

        if self.reconnect.base_delay_ms > self.reconnect.cap_delay_ms {
            return Err(Error::ConfigValidation {
                message: format!(
                    "base_delay_ms ({}) cannot be greater than cap_delay_ms ({})",
                    self.reconnect.base_delay_ms, self.reconnect.cap_delay_ms
                ),
            });
        }

        if self.reconnect.max_attempts == 0 {
            return Err(Error::ConfigValidation {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if self.limits.frame_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "frame_capacity must be greater than 0".to_string(),
            });
        }

        if self.limits.point_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "point_capacity must be greater than 0".to_string(),
            });
        }

        if self.limits.point_max_age == 0 {
            return Err(Error::ConfigValidation {
                message: "point_max_age must be greater than 0".to_string(),
            });
        }

        if self.limits.vitals_retention_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "vitals_retention_secs must be greater than 0".to_string(),
            });
        }

        if self.limits.log_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "log_capacity must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// The reconnect schedule described by this configuration.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect.base_delay_ms),
            Duration::from_millis(self.reconnect.cap_delay_ms),
            self.reconnect.max_attempts,
        )
    }

    /// The aggregation bounds described by this configuration.
    #[must_use]
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            frame_capacity: self.limits.frame_capacity,
            point_capacity: self.limits.point_capacity,
            point_max_age: self.limits.point_max_age,
            vitals_retention: Duration::from_secs(self.limits.vitals_retention_secs),
            log_capacity: self.limits.log_capacity,
            time_window: Duration::from_secs(self.limits.time_window_secs),
        }
    }

    /// Get the base reconnect delay as a Duration.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.base_delay_ms)
    }

    /// Get the backoff cap as a Duration.
    #[must_use]
    pub fn cap_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.cap_delay_ms)
    }

    /// Get the vitals retention window as a Duration.
    #[must_use]
    pub fn vitals_retention(&self) -> Duration {
        Duration::from_secs(self.limits.vitals_retention_secs)
    }
}
