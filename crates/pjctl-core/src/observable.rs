//! Observable Properties
//!
//! Change-notifying values backed by `tokio::sync::watch`. A driver owns the
//! `Observable` and writes to it; consumers (UI bindings, the CLI, tests)
//! hold clones or receivers and read the latest value or await changes.
//!
//! Two write paths mirror the two kinds of device feedback:
//!
//! - [`Observable::set_if_changed`] notifies only when the value differs
//!   (power, video mute, current input).
//! - [`Observable::set`] always notifies, even when the value is unchanged
//!   (warm-up/cool-down flags, lamp hours), so subscribers see every
//!   report from the device.
//!
//! # Example
//!
//! ```rust,ignore
//! let power = Observable::new("power_on", false)
//!     .with_description("Projector reports power on");
//!
//! let mut rx = power.subscribe();
//! tokio::spawn(async move {
//!     while rx.changed().await.is_ok() {
//!         println!("power is now {}", *rx.borrow());
//!     }
//! });
//!
//! power.set_if_changed(true);
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;

/// Descriptive metadata for an observable property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservableMetadata {
    /// Property name (unique within a device).
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Physical units, if any (e.g. "h" for lamp hours).
    pub units: Option<String>,
}

/// A thread-safe, observable value with change notifications.
///
/// Clones share the same channel and metadata.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    metadata: Arc<RwLock<ObservableMetadata>>,
}

impl<T: Clone + Send + Sync + 'static> Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("metadata", &*self.metadata.read())
            .field("subscribers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            metadata: Arc::new(RwLock::new(ObservableMetadata {
                name: name.into(),
                description: None,
                units: None,
            })),
        }
    }

    /// Add a description to this observable.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.metadata.write().description = Some(description.into());
        self
    }

    /// Add units to this observable.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.metadata.write().units = Some(units.into());
        self
    }

    /// Get the current value (clone).
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Store a value and notify all subscribers unconditionally.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Store a value, notifying subscribers only if it differs from the
    /// current one. Returns `true` when the value changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}
