// Error types for the relay server and the chat clients.
//
// Steady-state problems on a single connection never surface as these. The
// control loop logs them and drops that connection (see `session.rs`). What
// remains is start-up failure on the server side and the client taxonomy:
// could not connect, handshake refused, server gone, or a transient I/O
// error the caller may choose to ignore.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop the relay from starting.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("relay I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures seen by a messenger or viewer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// The relay refused the role claim. The reason is the relay's notice
    /// when it sent one.
    #[error("handshake rejected: {}", .0.as_deref().unwrap_or("connection closed by server"))]
    HandshakeRejected(Option<String>),
    #[error("the server has disconnected us")]
    PeerDisconnected,
    #[error("transient I/O error: {0}")]
    Transient(#[from] io::Error),
}

/// Failures from the connection registry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("name \"{0}\" is already taken")]
    NameTaken(String),
    #[error("name {0:?} contains control characters")]
    InvalidName(String),
}

impl ClientError {
    /// Peer address of a failed connect, for log fields.
    pub fn connect_failed(addr: SocketAddr, source: io::Error) -> Self {
        ClientError::ConnectFailed {
            addr: addr.to_string(),
            source,
        }
    }
}
