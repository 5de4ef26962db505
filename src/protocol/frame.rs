//! Frame struct with typed accessors.
//!
//! A [`Frame`] is one complete unit on the link. Inbound events are assumed
//! to carry whole frames; there is no reassembly across reads.
//!
//! # Example
//!
//! ```
//! use framelink::protocol::{ident, Frame, START, STOP};
//!
//! let mut bytes = [0u8; 12];
//! let len = Frame::echo(42).encode_into(&mut bytes).unwrap();
//!
//! assert_eq!(len, 12);
//! assert_eq!(bytes[0], START);
//! assert_eq!(bytes[2], ident::ECHO);
//! assert_eq!(bytes[11], STOP);
//! ```

use bytes::Bytes;

use super::wire_format::{
    decode_value, encode_value, ident, payload_len, FRAME_OVERHEAD, START, STOP, VALUE_COUNT,
};
use crate::error::{LinkError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    identifier: u8,
    count: u8,
    payload: Bytes,
}

impl Frame {
    /// Create a frame carrying `payload` verbatim.
    pub fn new(identifier: u8, payload: Bytes) -> Self {
        Self {
            identifier,
            count: VALUE_COUNT,
            payload,
        }
    }

    /// Create a frame with no payload.
    pub fn empty(identifier: u8) -> Self {
        Self::new(identifier, Bytes::new())
    }

    /// Registration acknowledgement.
    pub fn register_ack() -> Self {
        Self::empty(ident::REGISTER_ACK)
    }

    /// Echo response carrying a 64-bit value.
    pub fn echo(value: u64) -> Self {
        Self::new(ident::ECHO, Bytes::copy_from_slice(&encode_value(value)))
    }

    #[inline]
    pub fn identifier(&self) -> u8 {
        self.identifier
    }

    #[inline]
    pub fn count(&self) -> u8 {
        self.count
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Numeric value carried by the payload, if it is exactly 8 bytes.
    pub fn value(&self) -> Option<u64> {
        decode_value(&self.payload)
    }

    /// Size of the encoded frame.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Encode into an existing buffer, returning the number of bytes written.
    ///
    /// Fails if `buf` is shorter than [`Frame::encoded_len`].
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let len = encode_frame_into(buf, self.identifier, &self.payload)?;
        buf[1] = self.count;
        Ok(len)
    }

    /// Parse one complete response frame.
    ///
    /// Checks both sentinels and, for known identifiers, the response
    /// payload length. Inbound requests go through [`decode_identifier`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAME_OVERHEAD {
            return Err(LinkError::Protocol(format!(
                "frame too short: {} bytes",
                buf.len()
            )));
        }
        if buf[0] != START {
            return Err(LinkError::Protocol(format!(
                "bad start byte 0x{:02x}",
                buf[0]
            )));
        }
        let last = buf[buf.len() - 1];
        if last != STOP {
            return Err(LinkError::Protocol(format!("bad stop byte 0x{:02x}", last)));
        }

        let identifier = buf[2];
        let payload = &buf[3..buf.len() - 1];
        if let Some(expected) = payload_len(identifier) {
            if payload.len() != expected {
                return Err(LinkError::Protocol(format!(
                    "identifier 0x{:02x} expects {} payload bytes, got {}",
                    identifier,
                    expected,
                    payload.len()
                )));
            }
        }

        Ok(Self {
            identifier,
            count: buf[1],
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// Build a frame as a single byte vector.
///
/// Writes START, a count of 1, the identifier, the payload verbatim and STOP.
pub fn encode_frame(identifier: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.push(START);
    buf.push(VALUE_COUNT);
    buf.push(identifier);
    buf.extend_from_slice(payload);
    buf.push(STOP);
    buf
}

/// Encode a frame into `buf` without allocating.
///
/// Returns the number of bytes written, or a protocol error if the frame
/// does not fit.
fn encode_frame_into(buf: &mut [u8], identifier: u8, payload: &[u8]) -> Result<usize> {
    let len = FRAME_OVERHEAD + payload.len();
    if buf.len() < len {
        return Err(LinkError::Protocol(format!(
            "frame of {} bytes does not fit in {} byte buffer",
            len,
            buf.len()
        )));
    }
    buf[0] = START;
    buf[1] = VALUE_COUNT;
    buf[2] = identifier;
    buf[3..len - 1].copy_from_slice(payload);
    buf[len - 1] = STOP;
    Ok(len)
}

/// Extract the operation selector from an inbound buffer.
///
/// Peers either send a full frame, in which case the identifier sits after
/// START and count, or a bare command byte at offset 0.
pub fn decode_identifier(buf: &[u8]) -> Option<u8> {
    match buf {
        [] => None,
        [START, _, identifier, ..] => Some(*identifier),
        [first, ..] => Some(*first),
    }
}
