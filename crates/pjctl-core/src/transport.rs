//! Byte-stream transport for ASCII device protocols.
//!
//! A device is reached over RS-232 or a TCP socket; drivers should not care
//! which. This module splits the concern in two:
//!
//! - [`Connector`] knows how to open a stream ([`TcpConnector`],
//!   [`SerialConnector`]).
//! - [`Transport`] is what drivers talk to: connect, send text, report
//!   connectivity. [`StreamTransport`] implements it over any connector,
//!   running a reader task that frames incoming bytes with a
//!   [`LineFramer`] and pushes each frame into a [`FrameSink`].
//!
//! # Types
//!
//! - [`StreamIo`]: Trait alias combining AsyncRead + AsyncWrite
//! - [`DynStream`]: Type-erased boxed stream
//!
//! # Example
//!
//! ```rust,ignore
//! use pjctl_core::transport::{StreamTransport, TcpConnector, Transport};
//!
//! let queue = ReceiveQueue::spawn("proj-1", handler);
//! let transport = StreamTransport::new(
//!     Box::new(TcpConnector::new("10.0.0.20", 3002)),
//!     ")",
//!     queue.sink(),
//! );
//! transport.connect().await?;
//! transport.send_text("(PWR?)").await?;
//! ```

use crate::error::{PjError, PjResult};
use crate::framing::LineFramer;
use crate::observable::Observable;
use crate::queue::FrameSink;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// =============================================================================
// Stream Trait
// =============================================================================

/// Trait alias for async byte-stream I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a device stream. This includes:
/// - `tokio::net::TcpStream` (network-attached projectors)
/// - `tokio_serial::SerialStream` (RS-232)
/// - `tokio::io::DuplexStream` (testing)
pub trait StreamIo: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamIo for T {}

/// Type-erased boxed stream.
pub type DynStream = Box<dyn StreamIo>;

// =============================================================================
// Connectors
// =============================================================================

/// Opens a fresh stream to the device.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new stream.
    async fn connect(&self) -> PjResult<DynStream>;

    /// Human-readable endpoint description for logs.
    fn describe(&self) -> String;
}

/// TCP socket connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

/// Connect timeout for [`TcpConnector`].
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl TcpConnector {
    /// Create a connector for `host:port` with a 5 second connect timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> PjResult<DynStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let connect = tokio::net::TcpStream::connect(&addr);
        let stream = tokio::time::timeout(TCP_CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| PjError::Timeout(format!("connecting to {}", addr)))??;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

/// RS-232 connector (8N1, no flow control).
#[cfg(feature = "serial")]
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
}

#[cfg(feature = "serial")]
impl SerialConnector {
    /// Create a connector for a serial device path.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self) -> PjResult<DynStream> {
        let port = open_serial_async(&self.path, self.baud_rate).await?;
        Ok(Box::new(port))
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.path, self.baud_rate)
    }
}

/// Open a serial port using spawn_blocking.
///
/// Opening can block on some platforms, so it is kept off the async
/// runtime. Standard settings are applied: 8N1, no flow control.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
) -> PjResult<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    tokio::task::spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(PjError::from)
    })
    .await
    .map_err(|e| PjError::Transport(format!("spawn_blocking for serial open failed: {}", e)))?
}

// =============================================================================
// Transport Trait
// =============================================================================

/// What a driver needs from the link to its device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link. A no-op if already connected.
    async fn connect(&self) -> PjResult<()>;

    /// Close the link.
    async fn disconnect(&self);

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Write text to the device as-is.
    async fn send_text(&self, text: &str) -> PjResult<()>;

    /// Connectivity notifications.
    fn subscribe_connected(&self) -> watch::Receiver<bool>;
}

// =============================================================================
// StreamTransport
// =============================================================================

type SharedWriter = Arc<AsyncMutex<Option<WriteHalf<DynStream>>>>;

/// [`Transport`] over a [`Connector`], with a framing reader task.
pub struct StreamTransport {
    connector: Box<dyn Connector>,
    delimiter: Vec<u8>,
    sink: FrameSink,
    writer: SharedWriter,
    connected: Observable<bool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("endpoint", &self.connector.describe())
            .field("connected", &self.connected.get())
            .finish_non_exhaustive()
    }
}

impl StreamTransport {
    /// Create a transport. Nothing is opened until [`Transport::connect`].
    pub fn new(connector: Box<dyn Connector>, delimiter: impl AsRef<[u8]>, sink: FrameSink) -> Self {
        Self {
            connector,
            delimiter: delimiter.as_ref().to_vec(),
            sink,
            writer: Arc::new(AsyncMutex::new(None)),
            connected: Observable::new("connected", false)
                .with_description("Transport link is up"),
            reader: Mutex::new(None),
        }
    }

    /// Install an already-open stream (used by `connect` and by tests).
    pub async fn attach(&self, stream: DynStream) {
        self.abort_reader();

        let (read_half, write_half) = tokio::io::split(stream);
        *self.writer.lock().await = Some(write_half);

        let framer = LineFramer::new(&self.delimiter);
        let reader = tokio::spawn(Self::read_loop(
            read_half,
            framer,
            self.sink.clone(),
            self.connected.clone(),
            self.writer.clone(),
        ));
        *self.reader.lock() = Some(reader);
        self.connected.set_if_changed(true);
    }

    async fn read_loop(
        mut read_half: tokio::io::ReadHalf<DynStream>,
        mut framer: LineFramer,
        sink: FrameSink,
        connected: Observable<bool>,
        writer: SharedWriter,
    ) {
        let mut buf = [0u8; 512];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    info!("Device closed the connection");
                    break;
                }
                Ok(n) => {
                    for frame in framer.push(&buf[..n]) {
                        if !sink.enqueue(frame) {
                            debug!("Receive queue closed; stopping reader");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("Read failed: {}", e);
                    break;
                }
            }
        }
        if framer.pending() > 0 {
            debug!(bytes = framer.pending(), "Discarding unterminated data");
        }
        *writer.lock().await = None;
        connected.set_if_changed(false);
    }

    fn abort_reader(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl Transport for StreamTransport {
    async fn connect(&self) -> PjResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let endpoint = self.connector.describe();
        debug!(%endpoint, "Connecting");
        let stream = self.connector.connect().await?;
        self.attach(stream).await;
        info!(%endpoint, "Connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.abort_reader();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.connected.set_if_changed(false);
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    async fn send_text(&self, text: &str) -> PjResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(PjError::NotConnected)?;

        let result = async {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            *guard = None;
            drop(guard);
            self.abort_reader();
            self.connected.set_if_changed(false);
            return Err(PjError::Io(e));
        }
        Ok(())
    }

    fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.abort_reader();
    }
}
