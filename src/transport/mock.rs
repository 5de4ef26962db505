//! In-memory transport for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ConnectionHandle, Transport};
use crate::error::{LinkError, Result};
use crate::lock;
use crate::session::{CloseReason, ConnectionEvents};

/// Records every call. Sends complete only when the test says so, unless
/// built with [`MockTransport::completing`].
#[derive(Default)]
pub(crate) struct MockTransport {
    events: Mutex<Option<Arc<dyn ConnectionEvents>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    disconnects: Mutex<Vec<ConnectionHandle>>,
    idle_timeout: Mutex<Option<Duration>>,
    send_attempts: AtomicUsize,
    refuse_sends: AtomicUsize,
    listen_attempts: AtomicUsize,
    failing_listens: AtomicUsize,
    listening: AtomicBool,
    complete_immediately: AtomicBool,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
    last_handle: Mutex<Option<ConnectionHandle>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every accepted send completes before `send` returns.
    pub(crate) fn completing() -> Self {
        let mock = Self::default();
        mock.complete_immediately.store(true, Ordering::Release);
        mock
    }

    /// Refuse the next `n` sends with `TransportBusy`.
    pub(crate) fn refuse_next_sends(&self, n: usize) {
        self.refuse_sends.store(n, Ordering::Release);
    }

    /// Fail the next `n` listen calls.
    pub(crate) fn fail_next_listens(&self, n: usize) {
        self.failing_listens.store(n, Ordering::Release);
    }

    /// Complete the outstanding send.
    pub(crate) fn complete(&self) {
        self.in_flight.store(false, Ordering::Release);
        let handle = *lock(&self.last_handle);
        let events = lock(&self.events).clone();
        if let (Some(events), Some(handle)) = (events, handle) {
            events.on_sent(handle);
        }
    }

    /// Deliver a close notification.
    pub(crate) fn close(&self, handle: ConnectionHandle, reason: CloseReason) {
        self.in_flight.store(false, Ordering::Release);
        let events = lock(&self.events).clone();
        if let Some(events) = events {
            events.on_closed(handle, reason);
        }
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.sent).clone()
    }

    pub(crate) fn disconnects(&self) -> Vec<ConnectionHandle> {
        lock(&self.disconnects).clone()
    }

    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        *lock(&self.idle_timeout)
    }

    pub(crate) fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::Acquire)
    }

    pub(crate) fn listen_attempts(&self) -> usize {
        self.listen_attempts.load(Ordering::Acquire)
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    pub(crate) fn has_events(&self) -> bool {
        lock(&self.events).is_some()
    }

    /// Sends accepted while another was still in flight.
    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::Acquire)
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Transport for MockTransport {
    fn listen(&self, _port: u16) -> Result<()> {
        self.listen_attempts.fetch_add(1, Ordering::AcqRel);
        let remaining = self.failing_listens.load(Ordering::Acquire);
        if remaining > 0 {
            self.failing_listens.store(remaining - 1, Ordering::Release);
            return Err(LinkError::Transport(-1));
        }
        self.listening.store(true, Ordering::Release);
        Ok(())
    }

    fn set_idle_timeout(&self, timeout: Duration) {
        *lock(&self.idle_timeout) = Some(timeout);
    }

    fn register_events(&self, events: Arc<dyn ConnectionEvents>) {
        *lock(&self.events) = Some(events);
    }

    fn send(&self, handle: ConnectionHandle, data: &[u8]) -> Result<()> {
        self.send_attempts.fetch_add(1, Ordering::AcqRel);
        let refused = self.refuse_sends.load(Ordering::Acquire);
        if refused > 0 {
            self.refuse_sends.store(refused - 1, Ordering::Release);
            return Err(LinkError::TransportBusy);
        }

        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.overlaps.fetch_add(1, Ordering::AcqRel);
        }
        lock(&self.sent).push(data.to_vec());
        *lock(&self.last_handle) = Some(handle);

        if self.complete_immediately.load(Ordering::Acquire) {
            self.complete();
        }
        Ok(())
    }

    fn disconnect(&self, handle: ConnectionHandle) {
        lock(&self.disconnects).push(handle);
    }
}
