//! Command dispatcher - the per-tick service routine.
//!
//! Each call to [`Dispatcher::service_tick`] looks at the pending command
//! slot and, if the link is idle, sends the matching response:
//!
//! | Command    | Response                         | Side effect on success          |
//! |------------|----------------------------------|---------------------------------|
//! | `Register` | `START, 1, REGISTER_ACK, STOP`   | registered, clock synchronized  |
//! | `Echo`     | `START, 1, '!', <u64 time>, STOP` | none                           |
//! | other      | nothing                          | none                            |
//!
//! A command is taken out of the slot once the tick commits to it, so a
//! failed send never wedges later commands and a command that arrives while
//! the response is in flight is kept for the next tick. A command found
//! while a send is still in flight, or while no outbound buffer is free,
//! stays in the slot for a later tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Instant;

use crate::error::Result;
use crate::protocol::{Command, Frame, FrameBuffer, FramePool};
use crate::rtc::RtcClock;
use crate::sender::ReliableSender;
use crate::session::Session;
use crate::transport::Transport;

/// What a service tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No command pending.
    Idle,
    /// A send is still in flight; the command waits.
    Busy,
    /// No outbound buffer was available; the command waits.
    Deferred,
    /// The response was sent and confirmed.
    Responded(Command),
    /// The response could not be delivered.
    SendFailed(Command),
    /// The identifier is not a known command; nothing was sent.
    Dropped(u8),
}

/// Executes pending commands, one at a time.
pub struct Dispatcher<T: Transport, C: RtcClock> {
    session: Arc<Session>,
    sender: ReliableSender<T>,
    rtc: Arc<C>,
    pool: FramePool,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag when the tick ends.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: Transport, C: RtcClock> Dispatcher<T, C> {
    pub fn new(
        session: Arc<Session>,
        sender: ReliableSender<T>,
        rtc: Arc<C>,
        pool: FramePool,
    ) -> Self {
        Self {
            session,
            sender,
            rtc,
            pool,
            in_progress: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[inline]
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Run one service tick.
    pub async fn service_tick(&self) -> TickOutcome {
        let Some(identifier) = self.session.pending().peek() else {
            return TickOutcome::Idle;
        };

        if !self.session.is_transmission_finished() {
            return TickOutcome::Busy;
        }
        let Some(_tick) = TickGuard::enter(&self.in_progress) else {
            return TickOutcome::Busy;
        };

        let mut buf = match self.pool.try_acquire() {
            Ok(buf) => buf,
            Err(e) => {
                tracing::warn!("Command 0x{:02x} deferred: {}", identifier, e);
                return TickOutcome::Deferred;
            }
        };

        // Consumed before sending; a command arriving during the send waits
        // for the next tick.
        let Some(identifier) = self.session.pending().take() else {
            return TickOutcome::Idle;
        };

        let outcome = match Command::try_from(identifier) {
            Ok(Command::Register) => self.register(&mut buf).await,
            Ok(Command::Echo) => self.echo(&mut buf).await,
            Err(e) => {
                tracing::debug!("{}", e);
                TickOutcome::Dropped(identifier)
            }
        };
        drop(buf);
        outcome
    }

    async fn register(&self, buf: &mut FrameBuffer) -> TickOutcome {
        tracing::debug!("Confirming registration");
        let start = Instant::now();

        match self.respond(buf, &Frame::register_ack()).await {
            Ok(()) => {
                self.session.set_registered(true);
                self.rtc.synchronize(true);
                tracing::info!("Registered in {:?}", start.elapsed());
                TickOutcome::Responded(Command::Register)
            }
            Err(e) => {
                self.session.set_registered(false);
                tracing::warn!("Registration not confirmed: {}", e);
                TickOutcome::SendFailed(Command::Register)
            }
        }
    }

    async fn echo(&self, buf: &mut FrameBuffer) -> TickOutcome {
        let now = self.rtc.now();
        tracing::debug!("Echo requested, reporting time {}", now);

        match self.respond(buf, &Frame::echo(now)).await {
            Ok(()) => TickOutcome::Responded(Command::Echo),
            Err(e) => {
                tracing::warn!("Echo response not delivered: {}", e);
                TickOutcome::SendFailed(Command::Echo)
            }
        }
    }

    async fn respond(&self, buf: &mut FrameBuffer, frame: &Frame) -> Result<()> {
        let len = frame.encode_into(&mut buf[..])?;
        self.sender.send(&buf[..len]).await
    }
}

impl<T: Transport, C: RtcClock> std::fmt::Debug for Dispatcher<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.session.pending().peek())
            .field("pool_in_use", &self.pool.in_use())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    use crate::protocol::{ident, START, STOP};
    use crate::session::{CloseReason, ConnectionEvents, ConnectionState};
    use crate::transport::mock::MockTransport;
    use crate::transport::ConnectionHandle;

    const MAX_WAIT: Duration = Duration::from_millis(100);
    const POLL: Duration = Duration::from_millis(1);
    const HANDLE: ConnectionHandle = ConnectionHandle::new(1);

    #[derive(Default)]
    struct FixedRtc {
        now: u64,
        syncs: AtomicU64,
    }

    impl RtcClock for FixedRtc {
        fn now(&self) -> u64 {
            self.now
        }

        fn synchronize(&self, force: bool) {
            assert!(force);
            self.syncs.fetch_add(1, Ordering::AcqRel);
        }
    }

    struct Fixture {
        transport: Arc<MockTransport>,
        session: Arc<Session>,
        rtc: Arc<FixedRtc>,
        dispatcher: Dispatcher<MockTransport, FixedRtc>,
    }

    fn fixture(transport: MockTransport, buffers: usize) -> Fixture {
        let transport = Arc::new(transport);
        let session = Arc::new(Session::new());
        let rtc = Arc::new(FixedRtc {
            now: 0x0102_0304_0506_0708,
            ..FixedRtc::default()
        });
        transport.register_events(session.clone());
        session.on_connected(HANDLE);

        let sender = ReliableSender::with_timing(transport.clone(), session.clone(), MAX_WAIT, POLL);
        let dispatcher = Dispatcher::new(session.clone(), sender, rtc.clone(), FramePool::new(buffers));
        Fixture {
            transport,
            session,
            rtc,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_idle_without_command() {
        let f = fixture(MockTransport::completing(), 1);
        assert_eq!(f.dispatcher.service_tick().await, TickOutcome::Idle);
        assert_eq!(f.transport.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_registration_success() {
        let f = fixture(MockTransport::completing(), 1);
        f.session.on_data(HANDLE, &[START, 1, b'R', STOP]);

        let outcome = f.dispatcher.service_tick().await;

        assert_eq!(outcome, TickOutcome::Responded(Command::Register));
        assert_eq!(f.transport.sent(), vec![vec![START, 1, ident::REGISTER_ACK, STOP]]);
        assert!(f.session.is_registered());
        assert_eq!(f.rtc.syncs.load(Ordering::Acquire), 1);
        assert!(f.session.pending().is_empty());
    }

    #[tokio::test]
    async fn test_registration_failure_clears_slot() {
        let f = fixture(MockTransport::new(), 1);
        f.session.on_data(HANDLE, b"R");

        let outcome = f.dispatcher.service_tick().await;

        assert_eq!(outcome, TickOutcome::SendFailed(Command::Register));
        assert!(!f.session.is_registered());
        assert_eq!(f.rtc.syncs.load(Ordering::Acquire), 0);
        assert!(f.session.pending().is_empty());
        assert_eq!(f.session.state(), ConnectionState::Disconnected);
        assert_eq!(f.dispatcher.pool().in_use(), 0);
    }

    #[tokio::test]
    async fn test_echo_carries_time() {
        let f = fixture(MockTransport::completing(), 1);
        f.session.on_data(HANDLE, b"!");

        let outcome = f.dispatcher.service_tick().await;

        assert_eq!(outcome, TickOutcome::Responded(Command::Echo));
        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        let frame = &sent[0];
        assert_eq!(frame.len(), 12);
        assert_eq!(frame[0], START);
        assert_eq!(frame[1], 1);
        assert_eq!(frame[2], b'!');
        assert_eq!(&frame[3..11], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(frame[11], STOP);
        assert!(!f.session.is_registered());
    }

    #[tokio::test]
    async fn test_unrecognized_identifier_dropped() {
        let f = fixture(MockTransport::completing(), 1);
        f.session.pending().store(b'z');

        let outcome = f.dispatcher.service_tick().await;

        assert_eq!(outcome, TickOutcome::Dropped(b'z'));
        assert!(f.transport.sent().is_empty());
        assert!(f.session.pending().is_empty());
    }

    #[tokio::test]
    async fn test_busy_while_in_flight() {
        let f = fixture(MockTransport::new(), 1);
        f.session.on_data(HANDLE, b"!");
        f.session.begin_transmission();

        assert_eq!(f.dispatcher.service_tick().await, TickOutcome::Busy);
        assert_eq!(f.session.pending().peek(), Some(b'!'));
        assert_eq!(f.transport.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_no_buffer_defers_command() {
        let f = fixture(MockTransport::completing(), 0);
        f.session.on_data(HANDLE, b"R");

        assert_eq!(f.dispatcher.service_tick().await, TickOutcome::Deferred);
        assert_eq!(f.session.pending().peek(), Some(b'R'));
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_buffer_released_after_tick() {
        let f = fixture(MockTransport::completing(), 1);
        for _ in 0..3 {
            f.session.on_data(HANDLE, b"!");
            f.dispatcher.service_tick().await;
            assert_eq!(f.dispatcher.pool().in_use(), 0);
        }
        assert_eq!(f.transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_mid_response() {
        let f = fixture(MockTransport::new(), 1);
        f.session.on_data(HANDLE, b"R");

        let closer = {
            let transport = f.transport.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                transport.close(HANDLE, CloseReason::Disconnected);
            })
        };

        let start = Instant::now();
        let outcome = f.dispatcher.service_tick().await;
        closer.await.unwrap();

        assert_eq!(outcome, TickOutcome::SendFailed(Command::Register));
        assert!(start.elapsed() < MAX_WAIT);
        assert!(f.session.pending().is_empty());
    }

    #[tokio::test]
    async fn test_never_overlaps_sends() {
        let f = fixture(MockTransport::new(), 1);
        let transport = f.transport.clone();

        // Completes each send a little after it was issued.
        let completer = tokio::spawn(async move {
            for _ in 0..200 {
                tokio::time::sleep(Duration::from_millis(2)).await;
                if transport.is_in_flight() {
                    transport.complete();
                }
            }
        });

        for i in 0..20 {
            let id = if i % 2 == 0 { b'R' } else { b'!' };
            f.session.on_data(HANDLE, &[id]);
            f.session.on_data(HANDLE, &[id]);
            f.dispatcher.service_tick().await;
            assert!(f.session.pending().is_empty());
        }
        completer.abort();

        assert_eq!(f.transport.overlaps(), 0);
        assert_eq!(f.transport.sent().len(), 20);
    }

    /// Stands in for a peer that answers each response with a new command.
    fn spawn_peer(
        f: &Fixture,
        next: &'static [u8],
        complete_first: bool,
    ) -> tokio::task::JoinHandle<()> {
        let transport = f.transport.clone();
        let session = f.session.clone();
        tokio::spawn(async move {
            while transport.sent().is_empty() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            if complete_first {
                transport.complete();
                session.on_data(HANDLE, next);
            } else {
                session.on_data(HANDLE, next);
                tokio::time::sleep(Duration::from_millis(5)).await;
                transport.complete();
            }
        })
    }

    #[tokio::test]
    async fn test_command_after_completion_survives_tick() {
        let f = fixture(MockTransport::new(), 1);
        f.session.on_data(HANDLE, b"R");
        let peer = spawn_peer(&f, b"!", true);

        let outcome = f.dispatcher.service_tick().await;
        peer.await.unwrap();

        assert_eq!(outcome, TickOutcome::Responded(Command::Register));
        assert_eq!(f.session.pending().peek(), Some(b'!'));

        // The next tick answers it.
        let second = {
            let transport = f.transport.clone();
            tokio::spawn(async move {
                while transport.sent().len() < 2 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                transport.complete();
            })
        };
        assert_eq!(
            f.dispatcher.service_tick().await,
            TickOutcome::Responded(Command::Echo)
        );
        second.await.unwrap();
        assert!(f.session.pending().is_empty());
        assert_eq!(f.transport.sent()[1][2], ident::ECHO);
    }

    #[tokio::test]
    async fn test_command_during_send_survives_tick() {
        let f = fixture(MockTransport::new(), 1);
        f.session.on_data(HANDLE, b"!");
        let peer = spawn_peer(&f, b"R", false);

        let outcome = f.dispatcher.service_tick().await;
        peer.await.unwrap();

        assert_eq!(outcome, TickOutcome::Responded(Command::Echo));
        assert_eq!(f.session.pending().peek(), Some(b'R'));
        assert_eq!(f.transport.overlaps(), 0);
    }
}
