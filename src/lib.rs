//! # framelink
//!
//! Point-to-point command link between two constrained nodes.
//!
//! The node runs a TCP server for exactly one client. The client sends short
//! command frames; the node answers each one with a fixed-shape response
//! frame, never starting a new response before the previous one has been
//! confirmed by the network stack.
//!
//! ## Architecture
//!
//! ```text
//!   Transport ──events──▶ Session ──pending slot──▶ Dispatcher ──▶ ReliableSender ──▶ Transport
//!   (tcp.rs)              (state machine)            (service tick)   (bounded wait)
//! ```
//!
//! - [`protocol`]: frame layout, command set, outbound buffers
//! - [`transport`]: network stack interface and the tokio TCP binding
//! - [`session`]: connection state machine and pending command slot
//! - [`sender`]: send with completion wait and timeout
//! - [`dispatcher`]: per-tick command execution
//! - [`server`]: listener bootstrap and run loop
//! - [`rtc`]: time source and synchronization trigger
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use framelink::{ServerBuilder, SystemRtc, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ServerBuilder::new()
//!         .port(8266)
//!         .start(Arc::new(TcpTransport::new()), Arc::new(SystemRtc::new()))
//!         .await?;
//!
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod rtc;
pub mod sender;
pub mod server;
pub mod session;
pub mod transport;

pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, TickOutcome};
pub use error::{LinkError, Result};
pub use rtc::{RtcClock, SystemRtc};
pub use sender::ReliableSender;
pub use server::{Server, ServerBuilder, ShutdownHandle};
pub use session::{ConnectionEvents, Session};
pub use transport::{ConnectionHandle, TcpTransport, Transport};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
