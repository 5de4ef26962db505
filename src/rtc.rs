//! Time source and synchronization trigger.
//!
//! The echo command reports the node's current time, and a successful
//! registration asks the clock to resynchronize. Both go through
//! [`RtcClock`] so tests and other platforms can supply their own clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock consulted by the dispatcher.
pub trait RtcClock: Send + Sync + 'static {
    /// Current time in milliseconds.
    fn now(&self) -> u64;

    /// Resynchronize the clock. `force` skips any rate limiting.
    fn synchronize(&self, force: bool);
}

/// Wall clock in milliseconds since the Unix epoch.
#[derive(Debug, Default)]
pub struct SystemRtc {
    syncs: AtomicU64,
    last_sync: AtomicU64,
}

impl SystemRtc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of synchronizations requested so far.
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Acquire)
    }

    /// Time of the last synchronization, 0 if none.
    pub fn last_sync(&self) -> u64 {
        self.last_sync.load(Ordering::Acquire)
    }
}

impl RtcClock for SystemRtc {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn synchronize(&self, force: bool) {
        let now = self.now();
        self.last_sync.store(now, Ordering::Release);
        let count = self.syncs.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!("Clock synchronized at {} (force={}, count={})", now, force, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_2020() {
        let rtc = SystemRtc::new();
        assert!(rtc.now() > 1_577_836_800_000);
    }

    #[test]
    fn test_synchronize_records() {
        let rtc = SystemRtc::new();
        assert_eq!(rtc.sync_count(), 0);
        assert_eq!(rtc.last_sync(), 0);

        rtc.synchronize(true);
        rtc.synchronize(false);

        assert_eq!(rtc.sync_count(), 2);
        assert!(rtc.last_sync() > 0);
    }
}
