//! Fixed-size outbound frame buffers.
//!
//! The dispatcher needs one buffer large enough for the biggest response
//! frame each time it services a command. [`FramePool`] bounds how many of
//! those buffers may be live at once and hands them out as
//! [`FrameBuffer`] guards that give the slot back when dropped, so every
//! exit path of a dispatch releases its buffer.
//!
//! The pool tracks slots with a single atomic counter and can be cloned
//! freely; clones share the same counter.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::wire_format::MAX_FRAME_SIZE;
use crate::error::{LinkError, Result};

/// Default number of outbound buffers.
pub const DEFAULT_POOL_CAPACITY: usize = 1;

/// Bounded pool of outbound frame buffers.
#[derive(Debug, Clone)]
pub struct FramePool {
    /// Buffers currently on loan (shared by clones and loans).
    in_use: Arc<AtomicUsize>,
    /// Maximum number of buffers on loan at once.
    capacity: usize,
}

impl FramePool {
    /// Create a pool with `capacity` buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            in_use: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Take a buffer without waiting.
    ///
    /// Returns `Err(AllocationFailure)` when every buffer is in use.
    pub fn try_acquire(&self) -> Result<FrameBuffer> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return Err(LinkError::AllocationFailure);
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok(FrameBuffer {
            buf: [0u8; MAX_FRAME_SIZE],
            pool: self.clone(),
        })
    }

    /// Number of buffers currently on loan.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Maximum number of buffers on loan at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers that can still be acquired.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.in_use())
    }

    fn release(&self) {
        self.in_use.fetch_sub(1, Ordering::Release);
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

/// Outbound buffer on loan from a [`FramePool`].
///
/// Releases its slot on drop.
pub struct FrameBuffer {
    buf: [u8; MAX_FRAME_SIZE],
    pool: FramePool,
}

impl Deref for FrameBuffer {
    type Target = [u8; MAX_FRAME_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for FrameBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.pool.release();
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer").field("buf", &self.buf).finish()
    }
}
