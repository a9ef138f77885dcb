//! Single-consumer receive queue.
//!
//! The transport reader delivers frames on its own task. Handling them there
//! would let two deliveries mutate device state concurrently, so frames are
//! pushed onto a [`ReceiveQueue`] instead and one worker task applies them,
//! strictly in arrival order.
//!
//! A handler that fails (returns `Err` or panics) is logged and the worker
//! carries on with the next frame.

use crate::error::PjResult;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn, Instrument};

/// Callback applied to every dequeued frame.
pub type FrameHandler = Arc<dyn Fn(&str) -> PjResult<()> + Send + Sync>;

/// Cloneable producer side of a [`ReceiveQueue`].
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::UnboundedSender<String>,
}

impl FrameSink {
    /// Enqueue a frame for processing.
    ///
    /// Empty frames are skipped. Returns `false` if the worker has stopped.
    pub fn enqueue(&self, frame: impl Into<String>) -> bool {
        let frame = frame.into();
        if frame.is_empty() {
            debug!("Skipping empty frame");
            return true;
        }
        self.tx.send(frame).is_ok()
    }
}

/// A receive queue with one worker task draining it.
pub struct ReceiveQueue {
    name: String,
    sink: FrameSink,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for ReceiveQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveQueue")
            .field("name", &self.name)
            .field("running", &!self.worker.is_finished())
            .finish()
    }
}

impl ReceiveQueue {
    /// Spawn the worker and return the queue.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(name: impl Into<String>, handler: FrameHandler) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::debug_span!("receive_queue", queue = %name);
        let worker = tokio::spawn(Self::run(rx, handler).instrument(span));

        Self {
            name,
            sink: FrameSink { tx },
            worker,
        }
    }

    async fn run(mut rx: mpsc::UnboundedReceiver<String>, handler: FrameHandler) {
        while let Some(frame) = rx.recv().await {
            match catch_unwind(AssertUnwindSafe(|| handler(&frame))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(frame = %frame.trim(), "Frame handler failed: {}", e),
                Err(_) => error!(frame = %frame.trim(), "Frame handler panicked; continuing"),
            }
        }
        debug!("Receive queue closed");
    }

    /// Producer handle for the transport reader.
    pub fn sink(&self) -> FrameSink {
        self.sink.clone()
    }

    /// Enqueue a frame directly.
    pub fn enqueue(&self, frame: impl Into<String>) -> bool {
        self.sink.enqueue(frame)
    }

    /// Stop the worker. Frames still queued are discarded.
    pub fn shutdown(&self) {
        self.worker.abort();
    }
}

impl Drop for ReceiveQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PjError;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn recording_handler(seen: Arc<Mutex<Vec<String>>>) -> FrameHandler {
        Arc::new(move |frame: &str| {
            if frame.contains("boom") {
                return Err(PjError::Parse(frame.to_string()));
            }
            if frame.contains("panic") {
                panic!("handler blew up");
            }
            seen.lock().push(frame.to_string());
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_frames_processed_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = ReceiveQueue::spawn("test", recording_handler(seen.clone()));

        for i in 0..50 {
            assert!(queue.enqueue(format!("(PWR!{})", i % 2)));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 50);
        assert_eq!(seen[0], "(PWR!0)");
        assert_eq!(seen[1], "(PWR!1)");
    }

    #[tokio::test]
    async fn test_worker_survives_errors_and_panics() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = ReceiveQueue::spawn("test", recording_handler(seen.clone()));
        let sink = queue.sink();

        sink.enqueue("(boom)");
        sink.enqueue("(panic)");
        sink.enqueue("(SHU!1)");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*seen.lock(), vec!["(SHU!1)".to_string()]);
        assert!(sink.enqueue("(SHU!0)"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = ReceiveQueue::spawn("test", recording_handler(seen));
        let sink = queue.sink();

        queue.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!sink.enqueue("(PWR!1)"));
    }
}
