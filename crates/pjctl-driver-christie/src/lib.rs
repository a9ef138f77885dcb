//! Christie projector driver for pjctl.
//!
//! Supports the Christie 4K7-HS and 4K25-RGB over RS-232 or TCP using the
//! Christie ASCII serial protocol (`(PWR1)`, `(SIN+MAIN?)`, `(SHU!1)`, ...).
//!
//! - [`ChristieProjector`]: one live device session
//! - [`ChristieFactory`]: builds sessions from `[[devices]]` tables
//! - [`ProjectorModel`] / [`ModelDialect`](dialect::ModelDialect): per-model
//!   command codes and input tables

pub mod config;
pub mod dialect;
pub mod factory;
pub mod inputs;
pub mod poll;
pub mod protocol;
pub mod sender;
pub mod session;

pub use config::{ControlConfig, ProjectorConfig, ProjectorProperties, SessionLogging};
pub use dialect::ProjectorModel;
pub use factory::ChristieFactory;
pub use inputs::{ConnectionKind, InputPort, InputPortRegistry};
pub use session::{ChristieProjector, ProjectorEvent, ProjectorFeedback, ProjectorStatus};

