//! Status poll sequence.
//!
//! One poll asks for power, then (if the projector is on) the active input,
//! then (if the model reports lamp hours) the lamp counter. The steps are
//! spaced out so the projector is not flooded. Replies come back through
//! the receive queue like any other frame.

use crate::dialect::{ModelDialect, POWER_CODE};
use crate::sender::CommandSender;
use pjctl_core::observable::Observable;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Pause between poll steps.
pub const POLL_STEP_SETTLE: Duration = Duration::from_secs(2);

/// Runs the power → input → lamp query ring.
#[derive(Debug)]
pub struct PollSequencer {
    sender: CommandSender,
    dialect: &'static ModelDialect,
    has_lamps: bool,
    running: Mutex<()>,
}

impl PollSequencer {
    /// Sequencer for one session.
    pub fn new(sender: CommandSender, dialect: &'static ModelDialect, has_lamps: bool) -> Self {
        Self {
            sender,
            dialect,
            has_lamps,
            running: Mutex::new(()),
        }
    }

    /// Run one poll.
    ///
    /// `power_on` is read after the power query is sent, so it reflects the
    /// last state the projector reported. Returns `false` without sending
    /// anything if a poll is already in progress.
    pub async fn status_get(&self, power_on: &Observable<bool>) -> bool {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Status poll already running; skipping");
            return false;
        };

        self.sender.send_query(POWER_CODE).await;
        if !power_on.get() {
            return true;
        }

        tokio::time::sleep(POLL_STEP_SETTLE).await;
        self.sender.send_query(self.dialect.input_code).await;
        if !self.has_lamps {
            return true;
        }

        tokio::time::sleep(POLL_STEP_SETTLE).await;
        self.sender.send_query(self.dialect.lamp_query_code).await;
        true
    }
}
