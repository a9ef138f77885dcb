//! Recording transport for driver tests.
//!
//! Stands in for a real device link: every command written is captured,
//! connectivity is set by the test, and `connect` can be made to fail.

use crate::error::{PjError, PjResult};
use crate::observable::Observable;
use crate::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// In-memory [`Transport`] that records what is sent.
#[derive(Debug)]
pub struct MockTransport {
    connected: Observable<bool>,
    sent: Mutex<Vec<String>>,
    connects: AtomicUsize,
    fail_connect: AtomicBool,
}

impl MockTransport {
    fn with_state(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: Observable::new("connected", connected),
            sent: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
        })
    }

    /// A transport that is already up.
    pub fn connected() -> Arc<Self> {
        Self::with_state(true)
    }

    /// A transport that starts down.
    pub fn disconnected() -> Arc<Self> {
        Self::with_state(false)
    }

    /// Force the link state (e.g. simulate a dropped socket).
    pub fn set_connected(&self, up: bool) {
        self.connected.set_if_changed(up);
    }

    /// Make subsequent `connect` calls fail.
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Number of `connect` calls so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Everything sent so far, clearing the record.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// How many times exactly `text` was sent.
    pub fn count(&self, text: &str) -> usize {
        self.sent.lock().iter().filter(|s| s.as_str() == text).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> PjResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PjError::Transport("connection refused".into()));
        }
        self.connected.set_if_changed(true);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.set_if_changed(false);
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    async fn send_text(&self, text: &str) -> PjResult<()> {
        if !self.connected.get() {
            return Err(PjError::NotConnected);
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}
