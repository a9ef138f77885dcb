//! Device set assembled from configuration.

use crate::config::{AppConfig, DeviceDefinition};
use anyhow::{anyhow, Context, Result};
use pjctl_core::capabilities::{InputRouting, SwitchOutcome};
use pjctl_core::driver::{DeviceComponents, DriverRegistry};
use pjctl_driver_christie::ChristieFactory;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often a pending deferred switch is checked.
const PENDING_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Registry with every driver this binary ships.
pub fn registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register_factory(ChristieFactory);
    registry
}

/// Check every configured device against its driver.
///
/// Returns one error per device that fails, in config order.
pub fn validate_devices(registry: &DriverRegistry, config: &AppConfig) -> Vec<anyhow::Error> {
    config
        .devices
        .iter()
        .filter_map(|device| {
            registry
                .validate(&device.type_name, &device.driver_table())
                .with_context(|| format!("Device '{}'", device.key))
                .err()
        })
        .collect()
}

/// Video mute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MuteState {
    /// Blank the picture
    On,
    /// Restore the picture
    Off,
    /// Flip based on last feedback
    Toggle,
}

/// One control request against a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    /// Power on
    PowerOn,
    /// Power off
    PowerOff,
    /// Off if on, on otherwise
    PowerToggle,
    /// Select the input at a 1-based ordinal
    SelectInput(usize),
    /// Video mute
    VideoMute(MuteState),
    /// Run one status poll
    Status,
}

/// A built device.
pub struct Device {
    /// Device key
    pub key: String,
    /// Driver type name
    pub type_name: String,
    /// Capabilities exposed by the driver
    pub components: DeviceComponents,
}

impl Device {
    /// Build one device through the registry.
    pub async fn build(registry: &DriverRegistry, definition: &DeviceDefinition) -> Result<Self> {
        let components = registry
            .build(&definition.type_name, definition.driver_table())
            .await
            .with_context(|| format!("Failed to build device '{}'", definition.key))?;
        Ok(Self {
            key: definition.key.clone(),
            type_name: definition.type_name.clone(),
            components,
        })
    }

    /// Connect and start background polling.
    pub async fn start(&self) -> Result<()> {
        if let Some(lifecycle) = &self.components.lifecycle {
            lifecycle
                .start()
                .await
                .with_context(|| format!("Failed to start '{}'", self.key))?;
        }
        Ok(())
    }

    /// Stop background work and disconnect.
    pub async fn shutdown(&self) {
        if let Some(lifecycle) = &self.components.lifecycle {
            if let Err(e) = lifecycle.shutdown().await {
                warn!(device = %self.key, "Shutdown failed: {}", e);
            }
        }
    }

    /// Wait until the device has answered since [`start`](Self::start).
    ///
    /// Power and input feedback from that answer is applied by the time this
    /// returns, so power toggles and input requests act on real state.
    pub async fn wait_online(&self, timeout: Duration) -> Result<()> {
        let polling = self
            .components
            .polling
            .as_ref()
            .with_context(|| format!("'{}' has no status polling", self.key))?;
        let mut online = polling.subscribe_online();

        tokio::time::timeout(timeout, online.wait_for(|up| *up))
            .await
            .map_err(|_| anyhow!("'{}' did not answer within {:?}", self.key, timeout))?
            .map_err(|_| anyhow!("'{}' session closed", self.key))?;
        debug!(device = %self.key, "Device online");
        Ok(())
    }

    /// Apply one action. Input requests return how the switch was handled.
    pub async fn execute(&self, action: DeviceAction) -> Result<Option<SwitchOutcome>> {
        let components = &self.components;
        match action {
            DeviceAction::PowerOn | DeviceAction::PowerOff | DeviceAction::PowerToggle => {
                let power = components
                    .power
                    .as_ref()
                    .context("Device has no power control")?;
                match action {
                    DeviceAction::PowerOn => power.power_on().await?,
                    DeviceAction::PowerOff => power.power_off().await?,
                    _ => power.power_toggle().await?,
                }
            }
            DeviceAction::SelectInput(ordinal) => {
                let outcome = self.input()?.select_input(ordinal).await;
                info!(device = %self.key, ordinal, ?outcome, "Input request");
                if outcome == SwitchOutcome::Rejected {
                    anyhow::bail!("Input {} does not exist on '{}'", ordinal, self.key);
                }
                return Ok(Some(outcome));
            }
            DeviceAction::VideoMute(state) => {
                let mute = components
                    .video_mute
                    .as_ref()
                    .context("Device has no video mute")?;
                match state {
                    MuteState::On => mute.video_mute_on().await?,
                    MuteState::Off => mute.video_mute_off().await?,
                    MuteState::Toggle => mute.video_mute_toggle().await?,
                }
            }
            DeviceAction::Status => {
                if let Some(polling) = &components.polling {
                    polling.poll_status().await?;
                }
            }
        }
        Ok(None)
    }

    /// Wait until a deferred input switch has been sent.
    pub async fn wait_pending_switch(&self, timeout: Duration) -> Result<()> {
        let input = self.input()?;
        tokio::time::timeout(timeout, async {
            let mut ticker = tokio::time::interval(PENDING_CHECK_INTERVAL);
            while input.pending_input().is_some() {
                ticker.tick().await;
            }
        })
        .await
        .map_err(|_| {
            anyhow!(
                "Deferred input switch on '{}' still pending after {:?}",
                self.key,
                timeout
            )
        })
    }

    fn input(&self) -> Result<&Arc<dyn InputRouting>> {
        self.components
            .input
            .as_ref()
            .with_context(|| format!("'{}' has no input routing", self.key))
    }

    /// Status snapshot, `null` if the driver has no polling capability.
    pub fn snapshot(&self) -> serde_json::Value {
        self.components
            .polling
            .as_ref()
            .map(|p| p.snapshot())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// All enabled devices of one configuration.
pub struct Daemon {
    devices: Vec<Device>,
}

impl Daemon {
    /// Build every enabled device. Fails on the first device that cannot
    /// be built; nothing is started yet.
    pub async fn build(registry: &DriverRegistry, config: &AppConfig) -> Result<Self> {
        let mut devices = Vec::new();
        for definition in config.enabled_devices() {
            devices.push(Device::build(registry, definition).await?);
        }
        Ok(Self { devices })
    }

    /// Built devices, in config order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Look a device up by key.
    pub fn device(&self, key: &str) -> Result<&Device> {
        self.devices
            .iter()
            .find(|d| d.key == key)
            .ok_or_else(|| anyhow!("No enabled device with key '{}'", key))
    }

    /// Start every device. A device whose first connect fails keeps
    /// retrying in the background.
    pub async fn start_all(&self) -> Result<()> {
        for device in &self.devices {
            device.start().await?;
            info!(device = %device.key, driver = %device.type_name, "Device started");
        }
        Ok(())
    }

    /// Shut every device down.
    pub async fn shutdown_all(&self) {
        for device in &self.devices {
            device.shutdown().await;
        }
        info!(count = self.devices.len(), "All devices shut down");
    }

    /// Snapshots of every device.
    pub fn snapshots(&self) -> Vec<serde_json::Value> {
        self.devices.iter().map(Device::snapshot).collect()
    }
}
