//! Wire format constants and the command set.
//!
//! Every frame on the link has the same shape:
//! ```text
//! ┌───────┬───────┬────────────┬──────────────┬──────┐
//! │ START │ count │ identifier │ payload ...  │ STOP │
//! │ 1 byte│ 1 byte│ 1 byte     │ 0 or 8 bytes │1 byte│
//! └───────┴───────┴────────────┴──────────────┴──────┘
//! ```
//!
//! There is no length field. The payload length is implied by the
//! identifier, see [`payload_len`]. Numeric payloads are 64-bit
//! little-endian.

use crate::error::LinkError;

/// Start-of-frame sentinel (`¿` in Latin-1).
pub const START: u8 = 0xBF;

/// End-of-frame sentinel.
pub const STOP: u8 = b'#';

/// Value written to the `count` byte. Every frame carries a single value.
pub const VALUE_COUNT: u8 = 1;

/// Bytes of framing around the payload: START, count, identifier, STOP.
pub const FRAME_OVERHEAD: usize = 4;

/// Size of a numeric payload.
pub const VALUE_SIZE: usize = 8;

/// Largest frame in the command set (the echo response).
pub const MAX_FRAME_SIZE: usize = FRAME_OVERHEAD + VALUE_SIZE;

/// Identifiers understood on the link.
pub mod ident {
    /// Peer asks to be registered.
    pub const REGISTER: u8 = b'R';
    /// Registration acknowledgement sent back to the peer.
    pub const REGISTER_ACK: u8 = 0x06;
    /// Diagnostic echo of the node's current time.
    pub const ECHO: u8 = b'!';
}

/// Payload length of a node-to-peer frame carrying `identifier`.
///
/// Requests are bare identifiers; only responses carry a payload. Returns
/// `None` for identifiers outside the command set.
pub fn payload_len(identifier: u8) -> Option<usize> {
    match identifier {
        ident::REGISTER | ident::REGISTER_ACK => Some(0),
        ident::ECHO => Some(VALUE_SIZE),
        _ => None,
    }
}

/// Operation requested by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Registration request, answered with [`ident::REGISTER_ACK`].
    Register,
    /// Echo request, answered with the current time.
    Echo,
}

impl Command {
    /// Wire identifier of the request.
    #[inline]
    pub const fn id(self) -> u8 {
        match self {
            Command::Register => ident::REGISTER,
            Command::Echo => ident::ECHO,
        }
    }

    /// Look up the command selected by an identifier.
    #[inline]
    pub fn from_id(identifier: u8) -> Option<Self> {
        match identifier {
            ident::REGISTER => Some(Command::Register),
            ident::ECHO => Some(Command::Echo),
            _ => None,
        }
    }

    /// Size of the frame sent in response to this command.
    pub const fn response_len(self) -> usize {
        match self {
            Command::Register => FRAME_OVERHEAD,
            Command::Echo => FRAME_OVERHEAD + VALUE_SIZE,
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = LinkError;

    fn try_from(identifier: u8) -> Result<Self, Self::Error> {
        Command::from_id(identifier).ok_or(LinkError::UnrecognizedCommand(identifier))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Register => f.write_str("register"),
            Command::Echo => f.write_str("echo"),
        }
    }
}

/// Encode a 64-bit value as a numeric payload.
#[inline]
pub fn encode_value(value: u64) -> [u8; VALUE_SIZE] {
    value.to_le_bytes()
}

/// Decode a numeric payload.
///
/// Returns `None` unless `buf` is exactly [`VALUE_SIZE`] bytes.
#[inline]
pub fn decode_value(buf: &[u8]) -> Option<u64> {
    let bytes: [u8; VALUE_SIZE] = buf.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}
