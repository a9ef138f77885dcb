//! Core plumbing for pjctl device drivers.
//!
//! Everything here is device-agnostic: a driver crate combines these pieces
//! with its own protocol and state machine.
//!
//! - [`transport`]: byte-stream connectors (TCP, RS-232) and the
//!   [`Transport`](transport::Transport) trait drivers send through
//! - [`framing`]: delimiter-based frame extraction
//! - [`queue`]: single-consumer receive queue
//! - [`observable`]: change-notifying properties
//! - [`monitor`]: reconnect/poll tick and link status
//! - [`capabilities`] and [`driver`]: the contract between drivers and the
//!   composition root
//! - [`error`]: the shared error type
//!
//! The `mock` feature adds a recording transport for driver tests.

pub mod capabilities;
pub mod driver;
pub mod error;
pub mod framing;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod monitor;
pub mod observable;
pub mod queue;
pub mod transport;

pub use error::{PjError, PjResult};
