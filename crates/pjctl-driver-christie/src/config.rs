//! Device configuration for Christie projectors.
//!
//! A `[[devices]]` entry looks like:
//!
//! ```toml
//! [[devices]]
//! key = "proj-1"
//! name = "Main Hall Projector"
//! type = "Christie4k7hsProjector"
//!
//! [devices.control]
//! method = "tcp"
//! host = "10.0.0.20"
//! port = 3002
//!
//! [devices.properties]
//! pollIntervalMs = 60000
//! warmingTimeMs = 45000
//! coolingTimeMs = 45000
//! hasLamps = true
//! ```

use crate::dialect::ProjectorModel;
use pjctl_core::transport::{Connector, TcpConnector};
use pjctl_core::{PjError, PjResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum status poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 45_000;
/// Minimum warm-up interlock.
pub const MIN_WARMING_TIME_MS: u64 = 30_000;
/// Minimum cool-down interlock.
pub const MIN_COOLING_TIME_MS: u64 = 30_000;

/// Default Christie TCP control port.
pub const DEFAULT_TCP_PORT: u16 = 3002;

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_type_name() -> String {
    "ChristieProjector".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Timing and capability properties.
///
/// Durations below their floor are clamped up when read, never rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorProperties {
    /// Status poll interval in ms (floor 45 000).
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    /// Warm-up interlock in ms (floor 30 000).
    #[serde(alias = "warmingTimeMs")]
    pub warming_time_ms: u64,
    /// Cool-down interlock in ms (floor 30 000).
    #[serde(alias = "coolingTimeMs")]
    pub cooling_time_ms: u64,
    /// Projector reports lamp hours (enables the lamp step of the poll).
    #[serde(alias = "hasLamps")]
    pub has_lamps: bool,
    /// A motorised screen is installed.
    #[serde(alias = "hasScreen")]
    pub has_screen: bool,
    /// A projector lift is installed.
    #[serde(alias = "hasLift")]
    pub has_lift: bool,
}

impl Default for ProjectorProperties {
    fn default() -> Self {
        Self {
            poll_interval_ms: MIN_POLL_INTERVAL_MS,
            warming_time_ms: MIN_WARMING_TIME_MS,
            cooling_time_ms: MIN_COOLING_TIME_MS,
            has_lamps: false,
            has_screen: false,
            has_lift: false,
        }
    }
}

impl ProjectorProperties {
    /// Poll interval, clamped to its floor.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Warm-up time, clamped to its floor.
    pub fn warming_time(&self) -> Duration {
        Duration::from_millis(self.warming_time_ms.max(MIN_WARMING_TIME_MS))
    }

    /// Cool-down time, clamped to its floor.
    pub fn cooling_time(&self) -> Duration {
        Duration::from_millis(self.cooling_time_ms.max(MIN_COOLING_TIME_MS))
    }
}

/// How to reach the projector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ControlConfig {
    /// TCP socket.
    Tcp {
        /// Hostname or IP address.
        host: String,
        /// Control port.
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
    /// RS-232.
    Serial {
        /// Device path (e.g. `/dev/ttyUSB0`, `COM3`).
        port: String,
        /// Baud rate.
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

impl ControlConfig {
    /// Connector for this control method.
    pub fn connector(&self) -> Box<dyn Connector> {
        match self {
            ControlConfig::Tcp { host, port } => Box::new(TcpConnector::new(host.clone(), *port)),
            ControlConfig::Serial { port, baud_rate } => Box::new(
                pjctl_core::transport::SerialConnector::new(port.clone(), *baud_rate),
            ),
        }
    }

    fn validate(&self) -> PjResult<()> {
        match self {
            ControlConfig::Tcp { host, port } => {
                if host.trim().is_empty() {
                    return Err(PjError::Configuration("control.host is empty".into()));
                }
                if *port == 0 {
                    return Err(PjError::Configuration("control.port must be non-zero".into()));
                }
            }
            ControlConfig::Serial { port, baud_rate } => {
                if port.trim().is_empty() {
                    return Err(PjError::Configuration("control.port is empty".into()));
                }
                if *baud_rate == 0 {
                    return Err(PjError::Configuration(
                        "control.baud_rate must be non-zero".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Per-session diagnostic switches.
///
/// When a switch is off the corresponding messages are still emitted, at
/// `trace` instead of `debug`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLogging {
    /// Log every received frame.
    pub log_frames: bool,
    /// Log every transmitted command.
    pub log_commands: bool,
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectorConfig {
    /// Unique device key.
    pub key: String,
    /// Human-readable name (defaults to the key).
    #[serde(default)]
    pub name: Option<String>,
    /// Device type name; selects the model.
    #[serde(rename = "type", default = "default_type_name")]
    pub type_name: String,
    /// Disabled devices are validated but not started.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Transport settings.
    pub control: ControlConfig,
    /// Timing and capabilities.
    #[serde(default)]
    pub properties: ProjectorProperties,
    /// Diagnostics.
    #[serde(default)]
    pub logging: SessionLogging,
}

impl ProjectorConfig {
    /// TCP-controlled projector with default properties.
    pub fn tcp(key: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            key: key.into(),
            name: None,
            type_name: default_type_name(),
            enabled: true,
            control: ControlConfig::Tcp {
                host: host.into(),
                port,
            },
            properties: ProjectorProperties::default(),
            logging: SessionLogging::default(),
        }
    }

    /// Set the device type name.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Set the properties.
    pub fn with_properties(mut self, properties: ProjectorProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Set the diagnostic switches.
    pub fn with_logging(mut self, logging: SessionLogging) -> Self {
        self.logging = logging;
        self
    }

    /// Model selected by the type name.
    pub fn model(&self) -> ProjectorModel {
        ProjectorModel::from_type_name(&self.type_name)
    }

    /// Display name, falling back to the key.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> PjResult<()> {
        if self.key.trim().is_empty() {
            return Err(PjError::Configuration("device key is empty".into()));
        }
        self.control.validate()
    }
}
