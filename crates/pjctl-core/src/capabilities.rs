//! Atomic capability traits for display devices.
//!
//! A driver implements the traits matching what the hardware can do, and
//! hands them out through [`DeviceComponents`](crate::driver::DeviceComponents).
//! Consumers (the CLI, an automation host) program against the traits, never
//! against a concrete driver.
//!
//! # Design Philosophy
//!
//! - **Atomic**: each trait covers one feature (power, routing, mute)
//! - **Fire-and-forget**: commands return once written; state arrives later
//!   as feedback from the device and is read via the accessor methods
//! - **Thread-safe**: all traits require `Send + Sync`

use crate::error::{PjError, PjResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Result of an input selection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchOutcome {
    /// The select command was sent.
    Selected,
    /// Device is not on yet; the switch runs when warm-up completes.
    Deferred,
    /// Request ignored: the ordinal is out of range.
    Rejected,
}

/// Power on/off with warm-up and cool-down interlock.
#[async_trait]
pub trait PowerControl: Send + Sync {
    /// Turn the device on. Ignored while warming or cooling.
    async fn power_on(&self) -> PjResult<()>;

    /// Turn the device off. Ignored while warming or cooling.
    async fn power_off(&self) -> PjResult<()>;

    /// Off if on, on otherwise.
    async fn power_toggle(&self) -> PjResult<()>;

    /// Last power state reported by the device.
    fn is_powered(&self) -> bool;

    /// Warm-up interlock active.
    fn is_warming(&self) -> bool;

    /// Cool-down interlock active.
    fn is_cooling(&self) -> bool;
}

/// Input (source) routing.
#[async_trait]
pub trait InputRouting: Send + Sync {
    /// Select the input at 1-based `ordinal`.
    async fn select_input(&self, ordinal: usize) -> SwitchOutcome;

    /// Step to the next input.
    ///
    /// Not every protocol can do this; the default reports it unsupported.
    async fn input_toggle(&self) -> PjResult<()> {
        Err(PjError::Unsupported("InputToggle"))
    }

    /// Display names in ordinal order.
    fn input_names(&self) -> Vec<String>;

    /// 1-based ordinal of the active input, 0 if unknown.
    fn current_input_number(&self) -> usize;

    /// Ordinal of a deferred switch still waiting for warm-up.
    fn pending_input(&self) -> Option<usize> {
        None
    }

    /// Whether the input at `ordinal` is the active one.
    fn is_input_selected(&self, ordinal: usize) -> bool {
        ordinal != 0 && self.current_input_number() == ordinal
    }
}

/// Video mute (picture blanking).
#[async_trait]
pub trait VideoMute: Send + Sync {
    /// Blank the picture.
    async fn video_mute_on(&self) -> PjResult<()>;

    /// Restore the picture.
    async fn video_mute_off(&self) -> PjResult<()>;

    /// Flip based on the last reported state.
    async fn video_mute_toggle(&self) -> PjResult<()>;

    /// Last reported mute state.
    fn is_video_muted(&self) -> bool;
}

/// Status refresh and snapshot.
#[async_trait]
pub trait StatusPolling: Send + Sync {
    /// Query the device for fresh state.
    async fn poll_status(&self) -> PjResult<()>;

    /// Everything currently known about the device.
    fn snapshot(&self) -> serde_json::Value;

    /// Connected-and-answering flag. Turns `true` once the device has
    /// replied, after its reply has been applied.
    fn subscribe_online(&self) -> watch::Receiver<bool>;
}

/// Session lifecycle.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Connect and start background work.
    async fn start(&self) -> PjResult<()>;

    /// Stop background work and disconnect.
    async fn shutdown(&self) -> PjResult<()>;
}
