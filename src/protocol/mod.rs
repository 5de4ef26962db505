//! Protocol module - wire format, framing, and outbound buffers.
//!
//! - Frame layout constants and the command set
//! - [`Frame`] encoding and decoding
//! - [`FramePool`] for bounded outbound buffers

mod frame;
mod frame_pool;
mod wire_format;

pub use frame::{decode_identifier, encode_frame, Frame};
pub use frame_pool::{FrameBuffer, FramePool, DEFAULT_POOL_CAPACITY};
pub use wire_format::{
    decode_value, encode_value, ident, payload_len, Command, FRAME_OVERHEAD, MAX_FRAME_SIZE,
    START, STOP, VALUE_COUNT, VALUE_SIZE,
};
