//! Session - state of the single client connection.
//!
//! A [`Session`] holds everything that the transport notifications and the
//! service tick share:
//! - the live [`ConnectionHandle`] and [`ConnectionState`]
//! - the "transmission finished" signal the reliable sender waits on
//! - the [`PendingCommand`] slot
//! - the registration flag
//!
//! It implements [`ConnectionEvents`], so a transport binding drives the
//! state machine directly. Fields are atomics so a notification can land
//! while a send is suspended at its yield point.
//!
//! # Example
//!
//! ```
//! use framelink::session::{ConnectionEvents, ConnectionState, Session};
//! use framelink::transport::ConnectionHandle;
//!
//! let session = Session::new();
//! let handle = ConnectionHandle::new(1);
//!
//! session.on_connected(handle);
//! session.on_data(handle, b"R");
//!
//! assert_eq!(session.state(), ConnectionState::Established);
//! assert_eq!(session.pending().peek(), Some(b'R'));
//! ```

mod events;
mod pending;
mod state;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;

pub use events::ConnectionEvents;
pub use pending::PendingCommand;
pub use state::{CloseReason, ConnectionState, TransferState};

use crate::lock;
use crate::protocol::{decode_identifier, Command};
use crate::transport::ConnectionHandle;

/// Shared state for the one accepted connection.
#[derive(Debug)]
pub struct Session {
    /// Live connection, `None` while listening or after a close.
    handle: Mutex<Option<ConnectionHandle>>,
    /// Most recently closed connection; its late events are dropped.
    last_closed: Mutex<Option<ConnectionHandle>>,
    /// [`ConnectionState`] as its `u8` discriminant.
    state: AtomicU8,
    /// Cleared when a send starts, raised by its completion or a close.
    transmission_finished: AtomicBool,
    /// Set when the connection was closed or torn down locally.
    torn_down: AtomicBool,
    /// Set once a registration acknowledgement was delivered.
    registered: AtomicBool,
    /// How the last connection ended.
    close_reason: Mutex<Option<CloseReason>>,
    /// Most recent unserved command.
    pending: PendingCommand,
}

impl Session {
    /// Create a session in the `Listening` state.
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            last_closed: Mutex::new(None),
            state: AtomicU8::new(ConnectionState::Listening as u8),
            transmission_finished: AtomicBool::new(true),
            torn_down: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            close_reason: Mutex::new(None),
            pending: PendingCommand::new(),
        }
    }

    /// Current connection state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `true` while a client is connected.
    #[inline]
    pub fn is_established(&self) -> bool {
        self.state() == ConnectionState::Established
    }

    /// Handle of the live connection, if any.
    pub fn handle(&self) -> Option<ConnectionHandle> {
        *lock(&self.handle)
    }

    /// `true` once the connection was closed or torn down locally.
    #[inline]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// `true` when no send is waiting for its completion notification.
    #[inline]
    pub fn is_transmission_finished(&self) -> bool {
        self.transmission_finished.load(Ordering::Acquire)
    }

    /// Whether a send is waiting for its completion.
    pub fn transfer_state(&self) -> TransferState {
        if self.is_transmission_finished() {
            TransferState::Idle
        } else {
            TransferState::InFlight
        }
    }

    /// Whether the last registration acknowledgement was delivered.
    #[inline]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// How the most recent connection ended.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *lock(&self.close_reason)
    }

    /// The single-slot command register.
    #[inline]
    pub fn pending(&self) -> &PendingCommand {
        &self.pending
    }

    /// Mark a send as in flight.
    pub(crate) fn begin_transmission(&self) {
        self.transmission_finished.store(false, Ordering::Release);
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    /// Drop the connection after a send timed out.
    ///
    /// Nothing is in flight afterwards, so the transfer signal is raised too.
    pub(crate) fn mark_torn_down(&self) {
        *lock(&self.last_closed) = lock(&self.handle).take();
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::Release);
        self.torn_down.store(true, Ordering::Release);
        self.transmission_finished.store(true, Ordering::Release);
    }

    /// `false` if `handle` belongs to an earlier connection.
    fn is_current(&self, handle: ConnectionHandle) -> bool {
        match *lock(&self.handle) {
            Some(current) => current == handle,
            None => *lock(&self.last_closed) != Some(handle),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionEvents for Session {
    fn on_connected(&self, handle: ConnectionHandle) {
        tracing::info!("Connection {} established", handle);

        *lock(&self.handle) = Some(handle);
        *lock(&self.close_reason) = None;
        self.torn_down.store(false, Ordering::Release);
        self.transmission_finished.store(true, Ordering::Release);
        self.state
            .store(ConnectionState::Established as u8, Ordering::Release);
    }

    fn on_data(&self, handle: ConnectionHandle, data: &[u8]) {
        tracing::debug!("Received {} bytes on connection {}", data.len(), handle);

        if !self.is_current(handle) {
            tracing::debug!("Ignoring data from stale connection {}", handle);
            return;
        }

        let Some(identifier) = decode_identifier(data) else {
            tracing::debug!("Empty inbound buffer");
            return;
        };

        match Command::from_id(identifier) {
            Some(command) => {
                if let Some(previous) = self.pending.store(identifier) {
                    tracing::debug!(
                        "Pending command 0x{:02x} replaced by {} before dispatch",
                        previous,
                        command
                    );
                }
            }
            None => {
                tracing::debug!("Unrecognized identifier 0x{:02x} ignored", identifier);
            }
        }
    }

    fn on_sent(&self, handle: ConnectionHandle) {
        if !self.is_current(handle) {
            return;
        }
        tracing::debug!("Transmission on connection {} completed", handle);
        self.transmission_finished.store(true, Ordering::Release);
    }

    fn on_closed(&self, handle: ConnectionHandle, reason: CloseReason) {
        if !self.is_current(handle) {
            tracing::debug!("Ignoring close of stale connection {}", handle);
            return;
        }

        match reason {
            CloseReason::Disconnected => {
                tracing::info!("Connection {} disconnected", handle);
            }
            CloseReason::Reset { code } => {
                tracing::warn!("Connection {} interrupted, error code {}", handle, code);
            }
        }

        *lock(&self.handle) = None;
        *lock(&self.last_closed) = Some(handle);
        *lock(&self.close_reason) = Some(reason);
        self.torn_down.store(true, Ordering::Release);
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::Release);
        // Release any sender still waiting on this connection.
        self.transmission_finished.store(true, Ordering::Release);
    }
}
