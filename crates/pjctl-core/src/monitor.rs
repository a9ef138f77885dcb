//! Communication monitor.
//!
//! Tracks when a device last said anything and turns that into a coarse
//! link status. It also owns the periodic tick that keeps the device talking:
//! on every poll interval it reconnects a dropped transport, or runs the
//! driver's status poll when the link is up.
//!
//! Status thresholds (defaults):
//!
//! | Silence          | Status    |
//! |------------------|-----------|
//! | < 180 s          | `Ok`      |
//! | 180 s .. 300 s   | `Warning` |
//! | >= 300 s         | `Error`   |
//!
//! A disconnected transport is always `Error`. Before any traffic has been
//! seen the status stays `Unknown` until the warning threshold passes.

use crate::observable::Observable;
use crate::transport::Transport;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Link status derived from device traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    /// No traffic seen yet.
    Unknown,
    /// Device answered recently.
    Ok,
    /// Device has been quiet for a while.
    Warning,
    /// Device silent for too long, or transport down.
    Error,
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Unknown => write!(f, "UNKNOWN"),
            MonitorStatus::Ok => write!(f, "OK"),
            MonitorStatus::Warning => write!(f, "WARNING"),
            MonitorStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Configuration for the communication monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between poll ticks.
    pub poll_interval: Duration,
    /// Silence after which status becomes `Warning`.
    pub warning_after: Duration,
    /// Silence after which status becomes `Error`.
    pub error_after: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(45),
            warning_after: Duration::from_secs(180),
            error_after: Duration::from_secs(300),
        }
    }
}

/// Status poll run on each tick while connected.
pub type PollFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct MonitorInner {
    config: MonitorConfig,
    transport: Arc<dyn Transport>,
    started_at: Instant,
    last_activity: Mutex<Option<Instant>>,
    status: Observable<MonitorStatus>,
    online: Observable<bool>,
}

impl MonitorInner {
    fn evaluate(&self) -> MonitorStatus {
        let now = Instant::now();
        let last = *self.last_activity.lock();
        let status = if !self.transport.is_connected() {
            MonitorStatus::Error
        } else {
            let silence = now.duration_since(last.unwrap_or(self.started_at));
            if silence >= self.config.error_after {
                MonitorStatus::Error
            } else if silence >= self.config.warning_after {
                MonitorStatus::Warning
            } else if last.is_some() {
                MonitorStatus::Ok
            } else {
                MonitorStatus::Unknown
            }
        };

        if self.status.set_if_changed(status) {
            match status {
                MonitorStatus::Ok | MonitorStatus::Unknown => info!(%status, "Communication status"),
                MonitorStatus::Warning | MonitorStatus::Error => {
                    warn!(%status, "Communication status")
                }
            }
        }
        self.online
            .set_if_changed(self.transport.is_connected() && status == MonitorStatus::Ok);
        status
    }
}

/// Periodic reconnect/poll driver plus traffic-based link status.
pub struct CommunicationMonitor {
    inner: Arc<MonitorInner>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CommunicationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationMonitor")
            .field("config", &self.inner.config)
            .field("status", &self.inner.status.get())
            .finish_non_exhaustive()
    }
}

impl CommunicationMonitor {
    /// Create a monitor for `transport`. Nothing runs until [`start`](Self::start).
    pub fn new(transport: Arc<dyn Transport>, config: MonitorConfig) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                config,
                transport,
                started_at: Instant::now(),
                last_activity: Mutex::new(None),
                status: Observable::new("communication_status", MonitorStatus::Unknown),
                online: Observable::new("online", false)
                    .with_description("Connected and answering"),
            }),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Note that the device just sent something.
    pub fn record_activity(&self) {
        *self.inner.last_activity.lock() = Some(Instant::now());
        self.inner.evaluate();
    }

    /// Recompute status from elapsed silence and connectivity.
    pub fn evaluate(&self) -> MonitorStatus {
        self.inner.evaluate()
    }

    /// Current status.
    pub fn status(&self) -> Observable<MonitorStatus> {
        self.inner.status.clone()
    }

    /// Online flag: connected and status `Ok`.
    pub fn online(&self) -> Observable<bool> {
        self.inner.online.clone()
    }

    /// Whether the monitor task is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Start the tick task. The first tick fires immediately.
    ///
    /// Calling `start` while already running is a no-op.
    pub fn start(&self, poll: PollFn) {
        if self.is_running() {
            debug!("Monitor already running");
            return;
        }

        let token = CancellationToken::new();
        let inner = self.inner.clone();
        let cancel = token.clone();
        let span = tracing::debug_span!("monitor");

        let task = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(inner.config.poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let mut connected = inner.transport.subscribe_connected();

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        changed = connected.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            inner.evaluate();
                        }
                        _ = ticker.tick() => {
                            if inner.transport.is_connected() {
                                poll().await;
                            } else if let Err(e) = inner.transport.connect().await {
                                warn!("Reconnect failed: {}", e);
                            }
                            inner.evaluate();
                        }
                    }
                }
                debug!("Monitor stopped");
            }
            .instrument(span),
        );

        *self.cancel.lock() = Some(token);
        *self.task.lock() = Some(task);
    }

    /// Stop the tick task.
    pub fn stop(&self) {
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        self.task.lock().take();
    }
}

impl Drop for CommunicationMonitor {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[tokio::test(start_paused = true)]
    async fn test_status_follows_silence() {
        let transport = MockTransport::connected();
        let monitor = CommunicationMonitor::new(transport.clone(), MonitorConfig::default());

        assert_eq!(monitor.evaluate(), MonitorStatus::Unknown);
        monitor.record_activity();
        assert_eq!(monitor.status().get(), MonitorStatus::Ok);
        assert!(monitor.online().get());

        tokio::time::advance(Duration::from_secs(181)).await;
        assert_eq!(monitor.evaluate(), MonitorStatus::Warning);
        assert!(!monitor.online().get());

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(monitor.evaluate(), MonitorStatus::Error);

        monitor.record_activity();
        assert_eq!(monitor.status().get(), MonitorStatus::Ok);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_disconnected_is_error() {
        let transport = MockTransport::disconnected();
        let monitor = CommunicationMonitor::new(transport, MonitorConfig::default());
        monitor.record_activity();
        assert_eq!(monitor.status().get(), MonitorStatus::Error);
        assert!(!monitor.online().get());
        assert!(logs_contain("Communication status"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_reconnects_then_polls() {
        let transport = MockTransport::disconnected();
        let monitor = CommunicationMonitor::new(transport.clone(), MonitorConfig::default());
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        monitor.start(Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));

        // First tick is immediate and reconnects.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(polls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);

        monitor.stop();
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnect_keeps_trying() {
        let transport = MockTransport::disconnected();
        transport.fail_connects(true);
        let monitor = CommunicationMonitor::new(transport.clone(), MonitorConfig::default());
        monitor.start(Arc::new(|| Box::pin(async {})));

        tokio::time::sleep(Duration::from_secs(91)).await;
        assert_eq!(transport.connect_count(), 3);
        assert_eq!(monitor.status().get(), MonitorStatus::Error);
        monitor.stop();
    }
}
