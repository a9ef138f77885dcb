//! Outgoing command path.

use crate::config::SessionLogging;
use crate::protocol;
use pjctl_core::transport::Transport;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Formats commands and writes them to the transport.
///
/// Fire-and-forget: nothing waits for a reply. A command is dropped (and
/// logged) when the code is empty, the transport is down, or the write
/// fails. Reconnecting is the communication monitor's job.
#[derive(Clone)]
pub struct CommandSender {
    transport: Arc<dyn Transport>,
    logging: SessionLogging,
}

impl std::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender")
            .field("connected", &self.transport.is_connected())
            .field("logging", &self.logging)
            .finish()
    }
}

impl CommandSender {
    /// Sender over `transport`.
    pub fn new(transport: Arc<dyn Transport>, logging: SessionLogging) -> Self {
        Self { transport, logging }
    }

    /// Send `(code)`. Returns whether the command was written.
    pub async fn send_command(&self, code: &str) -> bool {
        if code.is_empty() {
            return false;
        }
        self.send_text(&protocol::format_verb(code)).await
    }

    /// Send `(codevalue)`, or `(code?)` when `value` is `None`.
    pub async fn send_value<V: Display>(&self, code: &str, value: Option<V>) -> bool {
        if code.is_empty() {
            return false;
        }
        let text = match value {
            Some(v) => protocol::format_set(code, v),
            None => protocol::format_query(code),
        };
        self.send_text(&text).await
    }

    /// Send `(codevalue)`.
    pub async fn send_set(&self, code: &str, value: i32) -> bool {
        self.send_value(code, Some(value)).await
    }

    /// Send `(code?)`.
    pub async fn send_query(&self, code: &str) -> bool {
        self.send_value::<i32>(code, None).await
    }

    async fn send_text(&self, text: &str) -> bool {
        if !self.transport.is_connected() {
            warn!(command = %text, "Device not connected; dropping command");
            return false;
        }

        if self.logging.log_commands {
            debug!(command = %text, "TX");
        } else {
            trace!(command = %text, "TX");
        }

        match self.transport.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(command = %text, "Send failed: {}", e);
                false
            }
        }
    }
}
