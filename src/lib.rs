//! # pjctl
//!
//! Control daemon for Christie projectors. The library half holds what the
//! `pjctl` binary is assembled from, so integration tests can drive it
//! without spawning a process:
//!
//! - **`config`**: Figment-based loading of `[application]`, `[logging]` and
//!   `[[devices]]` from TOML plus `PJCTL_` environment overrides.
//! - **`logging`**: `tracing-subscriber` setup (pretty, compact, JSON).
//! - **`daemon`**: builds the configured devices through the driver registry
//!   and starts or stops them together.
//!
//! Device plumbing lives in `pjctl-core`; the projector protocol and state
//! machine live in `pjctl-driver-christie`.

pub mod config;
pub mod daemon;
pub mod logging;

pub use pjctl_core::{PjError, PjResult};
