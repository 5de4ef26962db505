//! Single-slot register for the most recent inbound command.
//!
//! The inbound-data handler writes the slot and the dispatcher takes it.
//! There is no queue: a second write before the dispatcher runs replaces
//! the first one.

use std::sync::atomic::{AtomicU16, Ordering};

/// Marker for an empty slot. Outside the range of a one-byte identifier.
const EMPTY: u16 = u16::MAX;

/// Pending command slot.
#[derive(Debug)]
pub struct PendingCommand {
    /// Identifier widened to `u16`, or [`EMPTY`].
    slot: AtomicU16,
}

impl PendingCommand {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            slot: AtomicU16::new(EMPTY),
        }
    }

    /// Store an identifier, returning the one it replaced, if any.
    #[inline]
    pub fn store(&self, identifier: u8) -> Option<u8> {
        Self::decode(self.slot.swap(identifier as u16, Ordering::AcqRel))
    }

    /// Current identifier, without clearing it.
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        Self::decode(self.slot.load(Ordering::Acquire))
    }

    /// Remove and return the current identifier.
    #[inline]
    pub fn take(&self) -> Option<u8> {
        Self::decode(self.slot.swap(EMPTY, Ordering::AcqRel))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slot.load(Ordering::Acquire) == EMPTY
    }

    fn decode(raw: u16) -> Option<u8> {
        u8::try_from(raw).ok()
    }
}

impl Default for PendingCommand {
    fn default() -> Self {
        Self::new()
    }
}
