//! Server configuration.
//!
//! Every setting has a compile-time default, so `ServerConfig::default()`
//! is a working configuration. A JSON document can override any subset of
//! fields; durations are given in milliseconds.
//!
//! ```
//! use std::time::Duration;
//! use framelink::ServerConfig;
//!
//! let config = ServerConfig::from_json_str(r#"{ "port": 9000, "max_wait": 500 }"#).unwrap();
//! assert_eq!(config.port, 9000);
//! assert_eq!(config.max_wait, Duration::from_millis(500));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};
use crate::protocol::DEFAULT_POOL_CAPACITY;

/// Default listener port.
pub const DEFAULT_PORT: u16 = 8266;

/// Default bound on every blocking wait (send confirmation, listener setup).
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2);

/// Default inactivity before the transport drops the client.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause between polls inside a bounded wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default period of the service tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Settings for [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Local port of the listener. 0 picks an ephemeral port.
    pub port: u16,
    /// Bound on a send waiting for confirmation, and on listener setup.
    #[serde(with = "duration_ms")]
    pub max_wait: Duration,
    /// Inactivity before the client is dropped. Zero keeps idle clients.
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
    /// Yield granularity of bounded waits. Must be non-zero.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Period of the service tick in [`Server::run`](crate::Server::run).
    /// Must be non-zero.
    #[serde(with = "duration_ms")]
    pub tick_interval: Duration,
    /// Number of outbound frame buffers.
    pub outbound_buffers: usize,
}

impl ServerConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the run loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(LinkError::InvalidConfig("poll_interval must be non-zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(LinkError::InvalidConfig("tick_interval must be non-zero"));
        }
        Ok(())
    }

    /// Serialize to a JSON document.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_wait: DEFAULT_MAX_WAIT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tick_interval: DEFAULT_TICK_INTERVAL,
            outbound_buffers: DEFAULT_POOL_CAPACITY,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
