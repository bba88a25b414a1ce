// Runtime configuration for the relay server and the chat clients.
//
// `RelayConfig` defaults reproduce the classic setup: the "Bad IRC" chat on
// port 6000 with 2 KB socket buffers and a 10 ms tick. It can be loaded from a
// JSON file where every field is optional; missing fields keep their
// defaults. The `relay` binary then applies command-line overrides on top.
//
// Durations are stored as integer milliseconds so the JSON stays flat and
// human-editable; the `*_interval()`/`*_timeout()` accessors convert.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Socket buffer size and max bytes per read, on both sides of the wire.
pub const DEFAULT_BUFFER_SIZE: usize = 2 * 1024;

pub const DEFAULT_PORT: u16 = 6000;

pub const DEFAULT_CHAT_NAME: &str = "Bad IRC";

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    /// 0 lets the OS pick a free port (tests).
    pub port: u16,
    pub chat_name: String,
    pub buffer_size: usize,
    pub tick_interval_ms: u64,
    /// Bounded wait shared by one whole liveness scan, not per connection.
    pub liveness_timeout_ms: u64,
    /// How long a freshly accepted socket may stay silent before rejection.
    pub handshake_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub accepts_per_tick: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            chat_name: DEFAULT_CHAT_NAME.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            tick_interval_ms: 10,
            liveness_timeout_ms: 10,
            handshake_timeout_ms: 5_000,
            write_timeout_ms: 1_000,
            accepts_per_tick: 1,
        }
    }
}

impl RelayConfig {
    /// Load from a JSON file. Absent fields fall back to `Default`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loopback on an OS-assigned port; used by tests and embedded relays.
    pub fn loopback() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::default()
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Messenger/viewer configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub buffer_size: usize,
    pub liveness_timeout: Duration,
    /// How long a messenger waits for the relay to refuse its name.
    pub confirm_timeout: Duration,
    /// Sleep between iterations of a client's own tick loop.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            liveness_timeout: Duration::from_millis(10),
            confirm_timeout: Duration::from_millis(250),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl ClientConfig {
    /// The messenger loop waits on user input, so it ticks slower.
    pub fn messenger() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            ..Self::default()
        }
    }
}
