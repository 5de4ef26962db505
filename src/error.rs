//! Error types for framelink.

use thiserror::Error;

/// Main error type for all framelink operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration document could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Send was not confirmed within the maximum wait.
    #[error("Send not confirmed before timeout")]
    SendTimeout,

    /// Listener could not be established within the maximum wait.
    #[error("Listener not established before timeout")]
    AcceptTimeout,

    /// No connection is live.
    #[error("Not connected")]
    NotConnected,

    /// Connection closed while a send was waiting for confirmation.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Transport refused the send for now; the caller may retry.
    #[error("Transport busy")]
    TransportBusy,

    /// Transport reported an error status code.
    #[error("Transport error code {0}")]
    Transport(i32),

    /// No outbound frame buffer was available.
    #[error("Outbound buffer unavailable")]
    AllocationFailure,

    /// Identifier does not select any known operation.
    #[error("Unrecognized command identifier 0x{0:02x}")]
    UnrecognizedCommand(u8),

    /// A configuration value is out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(&'static str),

    /// Malformed frame.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
