//! tokio TCP binding of [`Transport`].
//!
//! - One listener, one client at a time. A second client is dropped while
//!   the first is connected.
//! - Each connection gets a reader task and a writer task. The reader
//!   delivers every read as one `on_data` call and enforces the idle
//!   timeout. The writer drains a one-slot channel, so at most one frame is
//!   queued; `on_sent` fires after the frame has been flushed.
//! - `on_closed` is emitted exactly once per connection, by the reader.
//!
//! # Example
//!
//! ```ignore
//! use framelink::transport::{TcpTransport, Transport};
//!
//! let transport = TcpTransport::new();
//! transport.listen(0)?;
//! println!("listening on {:?}", transport.local_addr());
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{ConnectionHandle, Transport};
use crate::config::DEFAULT_IDLE_TIMEOUT;
use crate::error::{LinkError, Result};
use crate::lock;
use crate::session::{CloseReason, ConnectionEvents};

/// Size of the per-connection read buffer. Frames are far smaller.
pub const READ_BUFFER_SIZE: usize = 256;

/// Error code reported when the OS gives none.
const UNKNOWN_ERROR_CODE: i32 = -1;

/// TCP transport backed by tokio.
///
/// Cheap to clone; clones share the listener and the live connection.
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<Inner>,
}

struct Inner {
    events: Mutex<Option<Arc<dyn ConnectionEvents>>>,
    active: Mutex<Option<ActiveConnection>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    idle_timeout_ms: AtomicU64,
    next_id: AtomicU64,
}

struct ActiveConnection {
    handle: ConnectionHandle,
    tx: mpsc::Sender<Bytes>,
    close: Option<oneshot::Sender<()>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                events: Mutex::new(None),
                active: Mutex::new(None),
                accept_task: Mutex::new(None),
                local_addr: Mutex::new(None),
                idle_timeout_ms: AtomicU64::new(DEFAULT_IDLE_TIMEOUT.as_millis() as u64),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Address the listener is bound to, once `listen` succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.inner.local_addr)
    }

    /// Handle of the connected client, if any.
    pub fn active_handle(&self) -> Option<ConnectionHandle> {
        lock(&self.inner.active).as_ref().map(|c| c.handle)
    }

    /// Stop accepting and close the live connection.
    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.inner.accept_task).take() {
            task.abort();
        }
        *lock(&self.inner.local_addr) = None;
        if let Some(handle) = self.active_handle() {
            self.disconnect(handle);
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn listen(&self, port: u16) -> Result<()> {
        if lock(&self.inner.accept_task).is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let std_listener = std::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?;
        std_listener.set_nonblocking(true)?;
        let listener = {
            let _enter = runtime.enter();
            TcpListener::from_std(std_listener)?
        };
        let addr = listener.local_addr()?;

        tracing::debug!("Listening on {}", addr);
        *lock(&self.inner.local_addr) = Some(addr);
        let task = runtime.spawn(accept_loop(listener, self.inner.clone()));
        *lock(&self.inner.accept_task) = Some(task);
        Ok(())
    }

    fn set_idle_timeout(&self, timeout: Duration) {
        self.inner
            .idle_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Release);
    }

    fn register_events(&self, events: Arc<dyn ConnectionEvents>) {
        *lock(&self.inner.events) = Some(events);
    }

    fn send(&self, handle: ConnectionHandle, data: &[u8]) -> Result<()> {
        let active = lock(&self.inner.active);
        match active.as_ref() {
            Some(conn) if conn.handle == handle => conn
                .tx
                .try_send(Bytes::copy_from_slice(data))
                .map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => LinkError::TransportBusy,
                    mpsc::error::TrySendError::Closed(_) => LinkError::NotConnected,
                }),
            _ => Err(LinkError::NotConnected),
        }
    }

    fn disconnect(&self, handle: ConnectionHandle) {
        let mut active = lock(&self.inner.active);
        if let Some(conn) = active.as_mut().filter(|c| c.handle == handle) {
            if let Some(close) = conn.close.take() {
                tracing::debug!("Disconnecting {}", handle);
                let _ = close.send(());
            }
        }
    }
}

impl Inner {
    fn events(&self) -> Option<Arc<dyn ConnectionEvents>> {
        lock(&self.events).clone()
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.load(Ordering::Acquire))
    }

    fn clear_active(&self, handle: ConnectionHandle) {
        let mut active = lock(&self.active);
        if active.as_ref().map(|c| c.handle) == Some(handle) {
            *active = None;
        }
    }
}

async fn accept_loop(listener: TcpListener, inner: Arc<Inner>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                continue;
            }
        };

        let Some(events) = inner.events() else {
            tracing::warn!("No event handlers registered, dropping {}", peer);
            continue;
        };

        if lock(&inner.active).is_some() {
            tracing::warn!("Client already connected, refusing {}", peer);
            continue;
        }

        let handle = ConnectionHandle::new(inner.next_id.fetch_add(1, Ordering::AcqRel));
        tracing::debug!("Accepted {} as {}", peer, handle);
        start_connection(stream, handle, events, inner.clone());
    }
}

fn start_connection(
    stream: TcpStream,
    handle: ConnectionHandle,
    events: Arc<dyn ConnectionEvents>,
    inner: Arc<Inner>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("set_nodelay failed: {}", e);
    }
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel(1);
    let (close_tx, close_rx) = oneshot::channel();

    *lock(&inner.active) = Some(ActiveConnection {
        handle,
        tx,
        close: Some(close_tx),
    });

    events.on_connected(handle);

    tokio::spawn(writer_loop(rx, writer, handle, events.clone()));
    tokio::spawn(reader_loop(reader, close_rx, handle, events, inner));
}

async fn reader_loop(
    mut reader: OwnedReadHalf,
    mut close_rx: oneshot::Receiver<()>,
    handle: ConnectionHandle,
    events: Arc<dyn ConnectionEvents>,
    inner: Arc<Inner>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    let reason = loop {
        let idle = inner.idle_timeout();
        tokio::select! {
            _ = &mut close_rx => break CloseReason::Disconnected,
            read = read_with_idle(&mut reader, &mut buf, idle) => match read {
                Err(_) => {
                    tracing::info!("Connection {} idle for {:?}, closing", handle, idle);
                    break CloseReason::Disconnected;
                }
                Ok(Ok(0)) => break CloseReason::Disconnected,
                Ok(Ok(n)) => events.on_data(handle, &buf[..n]),
                Ok(Err(e)) => {
                    break CloseReason::Reset {
                        code: e.raw_os_error().unwrap_or(UNKNOWN_ERROR_CODE),
                    }
                }
            },
        }
    };

    // Dropping the channel sender ends the writer, which drops the write half.
    inner.clear_active(handle);
    drop(reader);
    events.on_closed(handle, reason);
}

/// Read once, giving up after `idle`. A zero `idle` never times out.
async fn read_with_idle(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    idle: Duration,
) -> std::result::Result<std::io::Result<usize>, tokio::time::error::Elapsed> {
    if idle.is_zero() {
        Ok(reader.read(buf).await)
    } else {
        tokio::time::timeout(idle, reader.read(buf)).await
    }
}

async fn writer_loop(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: OwnedWriteHalf,
    handle: ConnectionHandle,
    events: Arc<dyn ConnectionEvents>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            tracing::warn!("Write on {} failed: {}", handle, e);
            return;
        }
        events.on_sent(handle);
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}
