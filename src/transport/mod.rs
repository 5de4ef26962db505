//! Transport module - the network stack seen through a narrow interface.
//!
//! The protocol layer never touches sockets. It talks to a [`Transport`]:
//! - `listen` brings the listener up and reports an immediate status
//! - `send` hands one frame over and reports an immediate status; the
//!   transmission itself completes later through
//!   [`ConnectionEvents::on_sent`]
//! - `disconnect` tears a connection down
//!
//! [`TcpTransport`] is the tokio binding.

mod tcp;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::session::ConnectionEvents;

pub use tcp::{TcpTransport, READ_BUFFER_SIZE};

/// Opaque identifier of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    /// Wrap a transport-assigned connection id.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw connection id.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Network stack used by the server.
///
/// All calls return immediately. Anything that completes later is reported
/// to the registered [`ConnectionEvents`].
pub trait Transport: Send + Sync + 'static {
    /// Start accepting connections on `port`.
    ///
    /// An error means the listener is not up yet; the caller may retry.
    fn listen(&self, port: u16) -> Result<()>;

    /// Inactivity period after which the transport drops the client.
    /// Zero disables the timeout.
    fn set_idle_timeout(&self, timeout: Duration);

    /// Register the receiver of connection notifications.
    fn register_events(&self, events: Arc<dyn ConnectionEvents>);

    /// Queue `data` for transmission on `handle`.
    ///
    /// `Ok` means the transport accepted the bytes; `on_sent` follows once
    /// they are on the wire.
    fn send(&self, handle: ConnectionHandle, data: &[u8]) -> Result<()>;

    /// Close the connection. `on_closed` follows.
    fn disconnect(&self, handle: ConnectionHandle);
}
