//! Daemon configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/pjctl.toml`)
//! 2. environment variables prefixed with `PJCTL_`, nested keys separated by
//!    a double underscore (`PJCTL_LOGGING__LEVEL=debug`)
//!
//! # Example
//! ```no_run
//! use pjctl::config::AppConfig;
//!
//! let config = AppConfig::load_from("config/pjctl.toml")?;
//! config.validate()?;
//! for device in config.enabled_devices() {
//!     println!("{} ({})", device.key, device.type_name);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/pjctl.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PJCTL_";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Projector definitions
    #[serde(default)]
    pub devices: Vec<DeviceDefinition>,
}

/// Application-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Instance name, shown in the startup banner.
    pub name: String,
    /// How often `run` logs a status snapshot per device, in seconds (0 = never).
    pub status_interval_secs: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "pjctl".to_string(),
            status_interval_secs: 300,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, coloured (development)
    #[default]
    Pretty,
    /// Single line, no colours (production)
    Compact,
    /// Newline-delimited JSON (log aggregation)
    Json,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level filter (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Emit span open/close events
    pub span_events: bool,
    /// Include source file and line
    pub file_and_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            span_events: false,
            file_and_line: false,
        }
    }
}

/// One `[[devices]]` entry.
///
/// Only the fields the daemon needs are typed here; everything else is
/// kept verbatim and handed to the driver factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Unique device key
    pub key: String,
    /// Driver type name (e.g. "Christie4k25rgbProjector")
    #[serde(rename = "type")]
    pub type_name: String,
    /// Disabled devices are validated but not started
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Driver-specific settings (name, control, properties, logging)
    #[serde(flatten)]
    pub settings: toml::Table,
}

fn default_enabled() -> bool {
    true
}

impl DeviceDefinition {
    /// The full device table as the driver factory expects it.
    pub fn driver_table(&self) -> toml::Value {
        let mut table = self.settings.clone();
        table.insert("key".into(), toml::Value::String(self.key.clone()));
        table.insert("type".into(), toml::Value::String(self.type_name.clone()));
        table.insert("enabled".into(), toml::Value::Boolean(self.enabled));
        toml::Value::Table(table)
    }
}

impl AppConfig {
    /// Load from `config/pjctl.toml` and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment.
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Parse a TOML document (no environment overrides).
    pub fn from_toml_str(toml: &str) -> Result<Self, figment::Error> {
        Figment::new().merge(Toml::string(toml)).extract()
    }

    /// Checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let level = self.logging.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            bail!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            );
        }

        let mut keys = HashSet::new();
        for device in &self.devices {
            if device.key.trim().is_empty() {
                bail!("Device with empty key (type '{}')", device.type_name);
            }
            if !keys.insert(device.key.as_str()) {
                bail!("Duplicate device key: {}", device.key);
            }
        }

        Ok(())
    }

    /// Devices with `enabled = true`.
    pub fn enabled_devices(&self) -> Vec<&DeviceDefinition> {
        self.devices.iter().filter(|d| d.enabled).collect()
    }

    /// Look a device up by key.
    pub fn device(&self, key: &str) -> Option<&DeviceDefinition> {
        self.devices.iter().find(|d| d.key == key)
    }
}
