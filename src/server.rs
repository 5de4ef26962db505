//! Server builder and run loop.
//!
//! The [`ServerBuilder`] configures the link; [`ServerBuilder::start`]
//! brings it up:
//! 1. Open the listener, retrying until `max_wait` runs out
//! 2. Set the idle timeout
//! 3. Register the session for connection events
//! 4. Build the sender and dispatcher
//!
//! The returned [`Server`] is then driven either tick by tick with
//! [`Server::service_tick`] or by [`Server::run`] until shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ServerConfig;
use crate::dispatcher::{Dispatcher, TickOutcome};
use crate::error::{LinkError, Result};
use crate::protocol::FramePool;
use crate::rtc::RtcClock;
use crate::sender::ReliableSender;
use crate::session::Session;
use crate::transport::Transport;

/// Builder for configuring and starting a [`Server`].
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the listener port.
    ///
    /// Default: 8266
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the bound on send confirmation and listener setup.
    ///
    /// Default: 2 seconds
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.config.max_wait = max_wait;
        self
    }

    /// Set how long an idle client is kept.
    ///
    /// Default: 60 seconds
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the pause between polls in bounded waits.
    ///
    /// Default: 1 ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the service tick period used by [`Server::run`].
    ///
    /// Default: 10 ms
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    /// Set the number of outbound frame buffers.
    ///
    /// Default: 1
    pub fn outbound_buffers(mut self, count: usize) -> Self {
        self.config.outbound_buffers = count;
        self
    }

    /// Bring the link up on `transport`.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if a poll or tick interval is zero.
    /// - `AcceptTimeout` if the listener could not be opened within `max_wait`.
    pub async fn start<T: Transport, C: RtcClock>(
        self,
        transport: Arc<T>,
        rtc: Arc<C>,
    ) -> Result<Server<T, C>> {
        Server::start(self.config, transport, rtc).await
    }
}

/// Wakes a running [`Server::run`] so it returns.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}

/// A listening link.
pub struct Server<T: Transport, C: RtcClock> {
    config: ServerConfig,
    transport: Arc<T>,
    session: Arc<Session>,
    dispatcher: Dispatcher<T, C>,
    shutdown: Arc<Notify>,
}

impl<T: Transport, C: RtcClock> Server<T, C> {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    async fn start(config: ServerConfig, transport: Arc<T>, rtc: Arc<C>) -> Result<Self> {
        config.validate()?;

        // 1. Open the listener
        Self::listen(&config, transport.as_ref()).await?;

        // 2. Drop silent clients
        transport.set_idle_timeout(config.idle_timeout);

        // 3. Route connection events to the session
        let session = Arc::new(Session::new());
        transport.register_events(session.clone());

        // 4. Response path
        let sender = ReliableSender::with_timing(
            transport.clone(),
            session.clone(),
            config.max_wait,
            config.poll_interval,
        );
        let pool = FramePool::new(config.outbound_buffers);
        let dispatcher = Dispatcher::new(session.clone(), sender, rtc, pool);

        tracing::info!("Listening on port {}", config.port);

        Ok(Self {
            config,
            transport,
            session,
            dispatcher,
            shutdown: Arc::new(Notify::new()),
        })
    }

    async fn listen(config: &ServerConfig, transport: &T) -> Result<()> {
        let start = Instant::now();
        loop {
            match transport.listen(config.port) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if start.elapsed() > config.max_wait {
                        tracing::error!(
                            "Listener on port {} not ready after {:?}: {}",
                            config.port,
                            config.max_wait,
                            e
                        );
                        return Err(LinkError::AcceptTimeout);
                    }
                    tracing::debug!("Listen on port {} failed, retrying: {}", config.port, e);
                }
            }
            tokio::time::sleep(config.poll_interval).await;
        }
    }

    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[inline]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[inline]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher<T, C> {
        &self.dispatcher
    }

    /// Run one service tick.
    pub async fn service_tick(&self) -> TickOutcome {
        self.dispatcher.service_tick().await
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Tick every `tick_interval` until [`ShutdownHandle::shutdown`] is called.
    ///
    /// A shutdown requested while a tick is sending takes effect once that
    /// tick returns.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = ticker.tick() => {
                    match self.dispatcher.service_tick().await {
                        TickOutcome::Idle | TickOutcome::Busy => {}
                        outcome => tracing::trace!("Tick: {:?}", outcome),
                    }
                }
            }
        }

        tracing::info!("Server stopped");
    }
}

impl<T: Transport, C: RtcClock> std::fmt::Debug for Server<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish()
    }
}
