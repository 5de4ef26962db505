//! Connection event interface.
//!
//! A transport binding reports everything that happens on the link
//! through these four notifications. They may arrive while a send is
//! waiting for confirmation, so implementors must only touch state that is
//! safe to share with the service tick.

use super::state::CloseReason;
use crate::transport::ConnectionHandle;

/// Receiver of transport notifications.
pub trait ConnectionEvents: Send + Sync {
    /// A client connected.
    fn on_connected(&self, handle: ConnectionHandle);

    /// Bytes arrived from the client. One call carries one whole frame.
    fn on_data(&self, handle: ConnectionHandle, data: &[u8]);

    /// The transport finished transmitting the last accepted send.
    fn on_sent(&self, handle: ConnectionHandle);

    /// The connection ended.
    fn on_closed(&self, handle: ConnectionHandle, reason: CloseReason);
}
