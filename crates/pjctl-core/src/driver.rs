//! Driver Factory and Component Types
//!
//! Drivers implement [`DriverFactory`] and are registered with a
//! [`DriverRegistry`] by the composition root (the `pjctl` binary). A
//! `[[devices]]` entry in the configuration names a driver type; the
//! registry finds the factory, which validates the TOML table and builds
//! the device.
//!
//! # Example: Implementing a Driver Factory
//!
//! ```rust,ignore
//! use pjctl_core::driver::{Capability, DeviceComponents, DriverFactory};
//! use futures::future::BoxFuture;
//!
//! pub struct AcmeFactory;
//!
//! impl DriverFactory for AcmeFactory {
//!     fn driver_type(&self) -> &'static str { "acme_projector" }
//!     fn name(&self) -> &'static str { "Acme Projector" }
//!     fn capabilities(&self) -> &'static [Capability] { &[Capability::PowerControl] }
//!
//!     fn validate(&self, config: &toml::Value) -> anyhow::Result<()> {
//!         let _: AcmeConfig = config.clone().try_into()?;
//!         Ok(())
//!     }
//!
//!     fn build(&self, config: toml::Value) -> BoxFuture<'static, anyhow::Result<DeviceComponents>> {
//!         Box::pin(async move {
//!             let driver = Arc::new(AcmeDriver::from_config(config.try_into()?)?);
//!             Ok(DeviceComponents {
//!                 power: Some(driver),
//!                 ..DeviceComponents::new()
//!             })
//!         })
//!     }
//! }
//! ```

use crate::capabilities::{InputRouting, Lifecycle, PowerControl, StatusPolling, VideoMute};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags, mirroring the capability traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Corresponds to [`crate::capabilities::PowerControl`]
    PowerControl,
    /// Corresponds to [`crate::capabilities::InputRouting`]
    InputRouting,
    /// Corresponds to [`crate::capabilities::VideoMute`]
    VideoMute,
    /// Corresponds to [`crate::capabilities::StatusPolling`]
    StatusPolling,
    /// Corresponds to [`crate::capabilities::Lifecycle`]
    Lifecycle,
}

// =============================================================================
// Device Components (Capability Bag)
// =============================================================================

/// Capability trait objects returned by a driver build.
///
/// A single driver object usually implements several traits, so the same
/// `Arc` is cloned into each slot.
#[derive(Default, Clone)]
pub struct DeviceComponents {
    /// Power control.
    pub power: Option<Arc<dyn PowerControl>>,
    /// Input routing.
    pub input: Option<Arc<dyn InputRouting>>,
    /// Video mute.
    pub video_mute: Option<Arc<dyn VideoMute>>,
    /// Status refresh and snapshot.
    pub polling: Option<Arc<dyn StatusPolling>>,
    /// Start/shutdown.
    pub lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl std::fmt::Debug for DeviceComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceComponents")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl DeviceComponents {
    /// Empty component bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capabilities present in this bag.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.power.is_some() {
            caps.push(Capability::PowerControl);
        }
        if self.input.is_some() {
            caps.push(Capability::InputRouting);
        }
        if self.video_mute.is_some() {
            caps.push(Capability::VideoMute);
        }
        if self.polling.is_some() {
            caps.push(Capability::StatusPolling);
        }
        if self.lifecycle.is_some() {
            caps.push(Capability::Lifecycle);
        }
        caps
    }
}

// =============================================================================
// Driver Factory Trait
// =============================================================================

/// Builds devices of one driver family from configuration.
pub trait DriverFactory: Send + Sync + 'static {
    /// Primary type name used in `[[devices]] type = "..."`.
    fn driver_type(&self) -> &'static str;

    /// Additional type names this factory answers to.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Human-readable driver name.
    fn name(&self) -> &'static str;

    /// Capabilities every built device provides.
    fn capabilities(&self) -> &'static [Capability];

    /// Check a device table without building anything.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Build a device from its table.
    ///
    /// `config` is the whole `[[devices]]` entry (including `type`, which
    /// some factories use to pick a model).
    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>>;
}

// =============================================================================
// Registry
// =============================================================================

/// Factory lookup by (case-insensitive) type name.
#[derive(Default)]
pub struct DriverRegistry {
    factories: Vec<Arc<dyn DriverFactory>>,
    by_type: HashMap<String, usize>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl DriverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its type name and aliases.
    pub fn register_factory(&mut self, factory: impl DriverFactory) {
        let index = self.factories.len();
        self.by_type
            .insert(factory.driver_type().to_ascii_lowercase(), index);
        for alias in factory.aliases() {
            self.by_type.insert(alias.to_ascii_lowercase(), index);
        }
        self.factories.push(Arc::new(factory));
    }

    /// Factory for `type_name`, if registered.
    pub fn factory(&self, type_name: &str) -> Option<Arc<dyn DriverFactory>> {
        self.by_type
            .get(&type_name.to_ascii_lowercase())
            .map(|&i| self.factories[i].clone())
    }

    /// All registered type names, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_type.keys().cloned().collect();
        types.sort();
        types
    }

    /// Validate a device table using the factory for `type_name`.
    pub fn validate(&self, type_name: &str, config: &toml::Value) -> Result<()> {
        self.factory(type_name)
            .ok_or_else(|| anyhow!("Unknown driver type '{}'", type_name))?
            .validate(config)
    }

    /// Build a device using the factory for `type_name`.
    pub async fn build(&self, type_name: &str, config: toml::Value) -> Result<DeviceComponents> {
        let factory = self
            .factory(type_name)
            .ok_or_else(|| anyhow!("Unknown driver type '{}'", type_name))?;
        factory.build(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullFactory;

    impl DriverFactory for NullFactory {
        fn driver_type(&self) -> &'static str {
            "NullProjector"
        }
        fn aliases(&self) -> &'static [&'static str] {
            &["null"]
        }
        fn name(&self) -> &'static str {
            "Null Projector"
        }
        fn capabilities(&self) -> &'static [Capability] {
            &[]
        }
        fn validate(&self, config: &toml::Value) -> Result<()> {
            config
                .get("key")
                .map(|_| ())
                .ok_or_else(|| anyhow!("missing 'key'"))
        }
        fn build(&self, _config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
            Box::pin(async { Ok(DeviceComponents::new()) })
        }
    }

    #[tokio::test]
    async fn test_registry_lookup_is_case_insensitive() {
        let mut registry = DriverRegistry::new();
        registry.register_factory(NullFactory);

        assert!(registry.factory("nullprojector").is_some());
        assert!(registry.factory("NULL").is_some());
        assert!(registry.factory("other").is_none());
        assert_eq!(registry.types(), vec!["null", "nullprojector"]);

        let components = registry
            .build("NullProjector", toml::Value::Table(Default::default()))
            .await
            .unwrap();
        assert!(components.capabilities().is_empty());
    }

    #[test]
    fn test_registry_validate() {
        let mut registry = DriverRegistry::new();
        registry.register_factory(NullFactory);

        let ok: toml::Value = toml::from_str("key = \"proj-1\"").unwrap();
        assert!(registry.validate("null", &ok).is_ok());

        let missing: toml::Value = toml::from_str("name = \"x\"").unwrap();
        assert!(registry.validate("null", &missing).is_err());
        assert!(registry.validate("unknown", &ok).is_err());
    }
}
