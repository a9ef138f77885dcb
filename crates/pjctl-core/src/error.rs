//! Error types for projector control.
//!
//! `PjError` is the single error enum shared by the core plumbing and the
//! driver crates. Most protocol-layer failures never leave the driver: they
//! are logged and the offending frame or command is dropped. The variants
//! below exist so that the places which *do* surface an error (construction,
//! configuration, unsupported operations, transport I/O inside the core) can
//! do so with `?`.
//!
//! ## Error Categories
//!
//! 1. **Configuration Errors** - `Configuration`
//!    - Occur while building a session from a config table
//!    - Recovery: fix the configuration and restart
//!
//! 2. **Transport Errors** - `Io`, `Serial`, `NotConnected`, `Transport`, `Timeout`
//!    - Occur while connecting or writing to the device
//!    - The driver logs these and drops the command; reconnecting is the
//!      communication monitor's job
//!
//! 3. **Protocol Errors** - `Parse`, `InvalidInput`, `Unsupported`
//!    - `Parse` and `InvalidInput` are logged and swallowed by the driver
//!    - `Unsupported` is the one error returned to the caller

use thiserror::Error;

/// Convenience alias for results using the projector error type.
pub type PjResult<T> = std::result::Result<T, PjError>;

/// Primary error type for projector control.
#[derive(Error, Debug)]
pub enum PjError {
    /// Configuration values parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed (socket, serial read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Opening or configuring a serial port failed.
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The transport has no live connection.
    #[error("Transport not connected")]
    NotConnected,

    /// Transport-level failure that is not a plain I/O error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A received frame could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Input ordinal outside `1..=count`.
    #[error("Input {ordinal} is out of range (1 - {count})")]
    InvalidInput {
        /// The requested 1-based ordinal
        ordinal: usize,
        /// Number of ports the model exposes
        count: usize,
    },

    /// Operation is not supported by this device protocol.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// An operation did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl PjError {
    /// Whether the error came from the transport layer.
    ///
    /// Transport errors are recoverable by reconnecting; everything else is
    /// either a programming/configuration error or protocol noise.
    pub fn is_transport(&self) -> bool {
        match self {
            PjError::Io(_) | PjError::NotConnected | PjError::Transport(_) | PjError::Timeout(_) => {
                true
            }
            #[cfg(feature = "serial")]
            PjError::Serial(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PjError::InvalidInput {
            ordinal: 12,
            count: 6,
        };
        assert_eq!(err.to_string(), "Input 12 is out of range (1 - 6)");

        let err = PjError::Unsupported("InputToggle");
        assert_eq!(err.to_string(), "InputToggle is not supported");
    }

    #[test]
    fn test_transport_classification() {
        assert!(PjError::NotConnected.is_transport());
        assert!(PjError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_transport());
        assert!(!PjError::Parse("bad frame".into()).is_transport());
        assert!(!PjError::Unsupported("InputToggle").is_transport());
    }
}
