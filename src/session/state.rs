//! Connection and transfer state types.
//!
//! ```text
//! Listening ──connect──▶ Established ──disconnect / reset / send timeout──▶ Disconnected
//!                            ▲                                                  │
//!                            └──────────────────── connect ─────────────────────┘
//! ```
//!
//! `Disconnected` is terminal for a connection; only a fresh accept brings
//! the session back to `Established`.

/// Lifecycle of the single client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// Listener is up, no client has connected yet.
    #[default]
    Listening = 0,
    /// A client is connected and sends may be issued.
    Established = 1,
    /// The connection was closed, reset, or torn down after a send timeout.
    Disconnected = 2,
}

impl ConnectionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Established,
            2 => ConnectionState::Disconnected,
            _ => ConnectionState::Listening,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Whether a send is waiting for its completion notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    InFlight,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly disconnect, idle expiry, or a local forced disconnect.
    Disconnected,
    /// Connection reset or failed with a transport error code.
    Reset { code: i32 },
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Disconnected => f.write_str("disconnected"),
            CloseReason::Reset { code } => write!(f, "reset (code {code})"),
        }
    }
}
