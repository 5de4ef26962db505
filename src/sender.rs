//! Reliable sender - a bounded, blocking send over a callback transport.
//!
//! [`Transport::send`] only queues bytes; the transport reports the end of
//! the transmission later through `on_sent`, which raises the session's
//! "transmission finished" signal. [`ReliableSender::send`] turns that into
//! one awaitable call:
//!
//! 1. Lower the finished signal and note the start time.
//! 2. Poll, sleeping `poll_interval` between rounds so notifications can run:
//!    - issue a send attempt if none has been accepted yet,
//!    - return once the finished signal is raised,
//!    - after `max_wait`, disconnect, tear the session down and fail.
//!
//! A send accepted by the transport is never issued again, so a frame goes
//! out at most once per call.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use crate::error::{LinkError, Result};
use crate::session::Session;
use crate::transport::Transport;

/// Sends one frame at a time and waits for its confirmation.
pub struct ReliableSender<T: Transport> {
    transport: Arc<T>,
    session: Arc<Session>,
    max_wait: Duration,
    poll_interval: Duration,
}

impl<T: Transport> ReliableSender<T> {
    /// Create a sender with the default wait bound and poll interval.
    pub fn new(transport: Arc<T>, session: Arc<Session>) -> Self {
        Self::with_timing(transport, session, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL)
    }

    /// Create a sender with custom timing.
    pub fn with_timing(
        transport: Arc<T>,
        session: Arc<Session>,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            session,
            max_wait,
            poll_interval,
        }
    }

    #[inline]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Send `frame` and wait until the transport confirms it.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no connection is established.
    /// - `ConnectionClosed` if the connection ended before confirmation.
    /// - `SendTimeout` if nothing was confirmed within `max_wait`; the
    ///   connection has been torn down.
    pub async fn send(&self, frame: &[u8]) -> Result<()> {
        let handle = match self.session.handle() {
            Some(handle) if self.session.is_established() => handle,
            _ => return Err(LinkError::NotConnected),
        };

        self.session.begin_transmission();
        let start = Instant::now();
        let mut accepted = false;

        loop {
            tokio::time::sleep(self.poll_interval).await;

            if !accepted {
                match self.transport.send(handle, frame) {
                    Ok(()) => {
                        accepted = true;
                        tracing::debug!("Send of {} bytes accepted on {}", frame.len(), handle);
                    }
                    Err(e) => tracing::debug!("Send attempt on {} not accepted: {}", handle, e),
                }
            }

            if self.session.is_transmission_finished() {
                if self.session.handle() == Some(handle) && self.session.is_established() {
                    return Ok(());
                }
                tracing::debug!("Connection {} closed while sending", handle);
                return Err(LinkError::ConnectionClosed);
            }

            if start.elapsed() > self.max_wait {
                tracing::warn!(
                    "Send on {} not confirmed after {:?}, disconnecting",
                    handle,
                    self.max_wait
                );
                self.transport.disconnect(handle);
                self.session.mark_torn_down();
                return Err(LinkError::SendTimeout);
            }
        }
    }
}
