// tcp_chat_relay — broadcast chat relay over plain TCP.
//
// The relay is a thin message broker. Messengers connect under a unique
// display name and send chat text. Viewers connect read-only and receive
// every message, plus join/leave notices, in the order the relay queued them.
// The relay keeps no history: a viewer sees only what is broadcast after it
// registers.
//
// Module overview:
// - `server.rs`:   Listener, pending handshakes, and the single-threaded
//                  tick loop (`RelayServer`, `start_relay`, `RelayHandle`).
// - `session.rs`:  Chat session state that the loop drives: handshake
//                  classification, liveness reaping, intake, broadcast.
// - `registry.rs`: Who is connected, in which role, under which name.
// - `queue.rs`:    FIFO of relay messages awaiting broadcast.
// - `liveness.rs`: Non-destructive "has the peer gone?" check, batched with
//                  `poll(2)`, with a per-role error policy.
// - `net.rs`:      Small socket helpers (buffer sizes, non-blocking reads).
// - `client.rs`:   `Messenger` and `Viewer` clients used by the binaries and
//                  the integration tests.
// - `config.rs`:   `RelayConfig` (JSON-loadable) and `ClientConfig`.
// - `error.rs`:    `thiserror` error enums for every surface.
//
// Dependencies: `tcp_chat_protocol` (wire vocabulary and line framing).
//
// The relay can run as a standalone binary (`main.rs`) or be embedded via the
// library API (`start_relay`).

pub mod client;
pub mod config;
pub mod error;
pub mod liveness;
pub mod net;
pub mod queue;
pub mod registry;
pub mod server;
pub mod session;

pub use client::{Messenger, Submission, Viewer};
pub use config::{ClientConfig, RelayConfig};
pub use error::{ClientError, ConfigError, RegistryError, RelayError};
pub use server::{RelayHandle, RelayServer, ServerState, start_relay};
