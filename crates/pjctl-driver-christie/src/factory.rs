//! Driver factory and capability wiring.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pjctl_core::driver::DriverRegistry;
//! use pjctl_driver_christie::ChristieFactory;
//!
//! let mut registry = DriverRegistry::new();
//! registry.register_factory(ChristieFactory);
//!
//! let table: toml::Value = toml::from_str(r#"
//!     key = "proj-1"
//!     type = "Christie4k7hsProjector"
//!     control = { method = "tcp", host = "10.0.0.20" }
//! "#)?;
//! let components = registry.build("Christie4k7hsProjector", table).await?;
//! components.lifecycle.unwrap().start().await?;
//! ```

use crate::config::ProjectorConfig;
use crate::session::ChristieProjector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use pjctl_core::capabilities::{
    InputRouting, Lifecycle, PowerControl, StatusPolling, SwitchOutcome, VideoMute,
};
use pjctl_core::driver::{Capability, DeviceComponents, DriverFactory};
use pjctl_core::PjResult;
use std::sync::Arc;
use tokio::sync::watch;

// =============================================================================
// ChristieFactory - DriverFactory implementation
// =============================================================================

/// Factory for Christie projector sessions.
pub struct ChristieFactory;

/// Static capabilities for Christie projectors
static CHRISTIE_CAPABILITIES: &[Capability] = &[
    Capability::PowerControl,
    Capability::InputRouting,
    Capability::VideoMute,
    Capability::StatusPolling,
    Capability::Lifecycle,
];

impl DriverFactory for ChristieFactory {
    fn driver_type(&self) -> &'static str {
        "ChristieProjector"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["Christie4k7hsProjector", "Christie4k25rgbProjector"]
    }

    fn name(&self) -> &'static str {
        "Christie 4K7-HS / 4K25-RGB Projector"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CHRISTIE_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: ProjectorConfig = config
            .clone()
            .try_into()
            .context("Invalid Christie projector config")?;
        cfg.validate()?;
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: ProjectorConfig = config
                .try_into()
                .context("Invalid Christie projector config")?;
            let projector = Arc::new(
                ChristieProjector::new(&cfg)
                    .with_context(|| format!("Failed to create projector '{}'", cfg.key))?,
            );

            Ok(DeviceComponents {
                power: Some(projector.clone()),
                input: Some(projector.clone()),
                video_mute: Some(projector.clone()),
                polling: Some(projector.clone()),
                lifecycle: Some(projector),
            })
        })
    }
}

// =============================================================================
// Capability trait implementations
// =============================================================================

#[async_trait]
impl PowerControl for ChristieProjector {
    async fn power_on(&self) -> PjResult<()> {
        ChristieProjector::power_on(self).await;
        Ok(())
    }

    async fn power_off(&self) -> PjResult<()> {
        ChristieProjector::power_off(self).await;
        Ok(())
    }

    async fn power_toggle(&self) -> PjResult<()> {
        ChristieProjector::power_toggle(self).await;
        Ok(())
    }

    fn is_powered(&self) -> bool {
        self.feedback().power_on.get()
    }

    fn is_warming(&self) -> bool {
        self.feedback().warming.get()
    }

    fn is_cooling(&self) -> bool {
        self.feedback().cooling.get()
    }
}

#[async_trait]
impl InputRouting for ChristieProjector {
    async fn select_input(&self, ordinal: usize) -> SwitchOutcome {
        self.request_input(ordinal).await
    }

    async fn input_toggle(&self) -> PjResult<()> {
        ChristieProjector::input_toggle(self).await
    }

    fn input_names(&self) -> Vec<String> {
        ChristieProjector::input_names(self)
    }

    fn current_input_number(&self) -> usize {
        ChristieProjector::current_input_number(self)
    }

    fn pending_input(&self) -> Option<usize> {
        ChristieProjector::pending_input(self)
    }
}

#[async_trait]
impl VideoMute for ChristieProjector {
    async fn video_mute_on(&self) -> PjResult<()> {
        ChristieProjector::video_mute_on(self).await;
        Ok(())
    }

    async fn video_mute_off(&self) -> PjResult<()> {
        ChristieProjector::video_mute_off(self).await;
        Ok(())
    }

    async fn video_mute_toggle(&self) -> PjResult<()> {
        ChristieProjector::video_mute_toggle(self).await;
        Ok(())
    }

    fn is_video_muted(&self) -> bool {
        self.feedback().video_mute.get()
    }
}

#[async_trait]
impl StatusPolling for ChristieProjector {
    async fn poll_status(&self) -> PjResult<()> {
        self.status_get().await;
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self.status()).unwrap_or(serde_json::Value::Null)
    }

    fn subscribe_online(&self) -> watch::Receiver<bool> {
        self.feedback().online.subscribe()
    }
}

#[async_trait]
impl Lifecycle for ChristieProjector {
    async fn start(&self) -> PjResult<()> {
        ChristieProjector::start(self).await;
        Ok(())
    }

    async fn shutdown(&self) -> PjResult<()> {
        ChristieProjector::shutdown(self).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> toml::Value {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_validate_accepts_device_table() {
        let cfg = table(
            r#"
            key = "proj-1"
            type = "Christie4k25rgbProjector"
            control = { method = "tcp", host = "10.0.0.20" }
            properties = { hasLamps = true }
            "#,
        );
        assert!(ChristieFactory.validate(&cfg).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_control() {
        let cfg = table(r#"key = "proj-1""#);
        assert!(ChristieFactory.validate(&cfg).is_err());

        let cfg = table(
            r#"
            key = "proj-1"
            control = { method = "tcp", host = "" }
            "#,
        );
        assert!(ChristieFactory.validate(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_build_exposes_all_capabilities() {
        let cfg = table(
            r#"
            key = "proj-1"
            name = "Main Hall"
            type = "Christie4k25rgbProjector"
            control = { method = "tcp", host = "127.0.0.1", port = 1 }
            "#,
        );
        let components = ChristieFactory.build(cfg).await.unwrap();
        assert_eq!(components.capabilities(), CHRISTIE_CAPABILITIES.to_vec());

        let input = components.input.unwrap();
        assert_eq!(input.input_names().len(), 11);
        assert_eq!(input.current_input_number(), 0);

        let snapshot = components.polling.unwrap().snapshot();
        assert_eq!(snapshot["name"], "Main Hall");
        assert_eq!(snapshot["model"], "christie_4k25_rgb");
    }
}
