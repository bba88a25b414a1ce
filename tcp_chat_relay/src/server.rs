// TCP listener and control loop for the chat relay.
//
// Architecture: one cooperative, single-threaded loop. Every tick runs these
// steps in a fixed order:
//
// 1. Accept up to `accepts_per_tick` new connections from the non-blocking
//    listener and park them in the pending list.
// 2. Classify pending connections whose first payload has arrived
//    (`Session::admit`). A peer that closed before speaking, or stayed silent
//    past `handshake_timeout`, is rejected. Nobody blocks on a silent peer.
// 3. Reap disconnected connections with one batched liveness scan.
// 4. Read available input from every messenger.
// 5. Drain the queue and broadcast it to every viewer.
//
// After that the loop sleeps `tick_interval` to bound CPU usage.
//
// The loop thread is the only reader and writer of every socket. Sockets stay
// in blocking mode. Reads go through `net::read_available`, which toggles
// non-blocking for a single read. Writes are bounded by the write timeout set
// at admission.
//
// Shutdown: the loop checks a shutdown flag at the top of each tick (set by
// `RelayHandle::stop` or a signal handler in `main.rs`). It flushes whatever
// is already queued once, then closes every connection and the listener.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;
use std::time::Instant;

use tcp_chat_protocol::HandshakeRejection;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::net;
use crate::session::{Session, reject_connection};

/// Smallest buffer a handshake is read into, whatever `buffer_size` says.
const MIN_HANDSHAKE_READ: usize = 512;

/// Lifecycle of a relay's control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Running = 1,
    ShuttingDown = 2,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

/// An accepted connection that has not sent its handshake yet.
struct Pending {
    stream: TcpStream,
    peer: SocketAddr,
    accepted_at: Instant,
}

/// The relay server: listener, pending handshakes, and the chat session.
pub struct RelayServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    pending: Vec<Pending>,
    session: Session,
    config: RelayConfig,
    state: Arc<AtomicU8>,
}

impl RelayServer {
    /// Bind the listening socket. The server is `Running` once this returns.
    pub fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr).map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        tracing::info!(addr = %local_addr, chat = %config.chat_name, "relay listening");

        Ok(Self {
            listener: Some(listener),
            local_addr,
            pending: Vec::new(),
            session: Session::from_config(&config),
            config,
            state: Arc::new(AtomicU8::new(ServerState::Running as u8)),
        })
    }

    /// The bound address, with the real port when 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Connections accepted but not yet classified.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Run one tick of the control loop, without the trailing sleep.
    pub fn tick(&mut self) {
        self.accept_new();
        self.classify_pending();
        self.session
            .reap_disconnected(self.config.liveness_timeout());
        self.session.collect_messages();
        self.session.flush();
    }

    /// Tick until `shutdown` is set, then shut down.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        let interval = self.config.tick_interval();
        while !shutdown.load(Ordering::SeqCst) {
            self.tick();
            thread::sleep(interval);
        }
        self.shutdown();
    }

    /// Flush what is already queued, close every connection and the
    /// listener. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state() == ServerState::Stopped {
            return;
        }
        self.set_state(ServerState::ShuttingDown);
        tracing::info!(
            messengers = self.session.publisher_count(),
            viewers = self.session.subscriber_count(),
            "relay shutting down"
        );

        self.session.flush();
        for pending in self.pending.drain(..) {
            net::close(pending.stream);
        }
        self.session.close_all();
        self.listener = None;

        self.set_state(ServerState::Stopped);
        tracing::info!("relay stopped");
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn accept_new(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        for _ in 0..self.config.accepts_per_tick.max(1) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(error) = stream.set_nonblocking(false) {
                        tracing::warn!(%peer, %error, "failed to configure socket");
                        net::close(stream);
                        continue;
                    }
                    if let Err(error) = net::set_buffer_sizes(&stream, self.config.buffer_size) {
                        tracing::debug!(%peer, %error, "failed to set socket buffers");
                    }
                    tracing::debug!(%peer, "accepted connection");
                    self.pending.push(Pending {
                        stream,
                        peer,
                        accepted_at: Instant::now(),
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    tracing::warn!(%error, "accept failed");
                    break;
                }
            }
        }
    }

    fn classify_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let timeout = self.config.handshake_timeout();
        let mut buf = vec![0u8; self.config.buffer_size.max(MIN_HANDSHAKE_READ)];

        for mut pending in std::mem::take(&mut self.pending) {
            match net::read_available(&mut pending.stream, &mut buf) {
                Ok(Some(n)) => {
                    // n == 0 means the peer closed without speaking, which
                    // `admit` rejects.
                    self.session.admit(pending.stream, pending.peer, &buf[..n]);
                }
                Ok(None) if pending.accepted_at.elapsed() >= timeout => {
                    reject_connection(pending.stream, pending.peer, &HandshakeRejection::TimedOut);
                }
                Ok(None) => self.pending.push(pending),
                Err(error) => {
                    tracing::debug!(peer = %pending.peer, %error, "handshake read failed");
                    reject_connection(pending.stream, pending.peer, &HandshakeRejection::NoPayload);
                }
            }
        }
    }
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    shutdown: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Start the relay on a background thread. Returns a handle for stopping it
/// and the actual bound address (useful when port 0 is used to let the OS
/// pick a free port).
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), RelayError> {
    let mut server = RelayServer::bind(config)?;
    let addr = server.local_addr();
    let state = server.state.clone();
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    let thread = thread::Builder::new()
        .name("chat-relay".into())
        .spawn(move || server.run(&shutdown_clone))?;

    Ok((
        RelayHandle {
            shutdown,
            state,
            thread: Some(thread),
        },
        addr,
    ))
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::time::Duration;

    use super::*;

    fn test_server(config: RelayConfig) -> RelayServer {
        RelayServer::bind(RelayConfig {
            chat_name: "Test".into(),
            ..config
        })
        .unwrap()
    }

    fn connect(server: &RelayServer) -> TcpStream {
        let stream = TcpStream::connect(server.local_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// Tick until `done` holds, up to about two seconds.
    fn tick_until(server: &mut RelayServer, done: impl Fn(&RelayServer) -> bool) {
        for _ in 0..200 {
            server.tick();
            if done(server) {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached");
    }

    #[test]
    fn bind_reports_ephemeral_port_and_running() {
        let server = test_server(RelayConfig::loopback());
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.state(), ServerState::Running);
    }

    #[test]
    fn bind_failure_names_address() {
        let first = test_server(RelayConfig::loopback());
        let taken = RelayConfig {
            port: first.local_addr().port(),
            ..RelayConfig::loopback()
        };
        let Err(err) = RelayServer::bind(taken) else {
            panic!("second bind on the same port succeeded");
        };
        assert!(matches!(err, RelayError::Bind { .. }));
        assert!(err.to_string().contains("127.0.0.1"));
    }

    #[test]
    fn viewer_handshake_over_ticks() {
        let mut server = test_server(RelayConfig::loopback());
        let mut client = connect(&server);
        client.write_all(b"viewer").unwrap();

        tick_until(&mut server, |s| s.session().subscriber_count() == 1);
        assert_eq!(server.pending_count(), 0);

        let mut line = String::new();
        BufReader::new(client).read_line(&mut line).unwrap();
        assert_eq!(line, "Welcome to the \"Test\" Chat Server!\n");
    }

    #[test]
    fn silent_connection_times_out() {
        let mut server = test_server(RelayConfig {
            handshake_timeout_ms: 50,
            ..RelayConfig::loopback()
        });
        let mut client = connect(&server);

        tick_until(&mut server, |s| s.pending_count() == 1);
        thread::sleep(Duration::from_millis(80));
        server.tick();
        assert_eq!(server.pending_count(), 0);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
        assert_eq!(server.session().subscriber_count(), 0);
    }

    #[test]
    fn close_before_handshake_is_rejected() {
        let mut server = test_server(RelayConfig::loopback());
        let client = connect(&server);
        tick_until(&mut server, |s| s.pending_count() == 1);

        drop(client);
        tick_until(&mut server, |s| s.pending_count() == 0);
        assert_eq!(server.session().publisher_count(), 0);
        assert_eq!(server.session().subscriber_count(), 0);
    }

    #[test]
    fn accepts_are_limited_per_tick() {
        let mut server = test_server(RelayConfig::loopback());
        let _clients: Vec<TcpStream> = (0..3).map(|_| connect(&server)).collect();
        thread::sleep(Duration::from_millis(50));

        server.tick();
        assert_eq!(server.pending_count(), 1);
        server.tick();
        server.tick();
        assert_eq!(server.pending_count(), 3);
    }

    #[test]
    fn run_exits_on_flag_and_closes_everything() {
        let mut server = test_server(RelayConfig::loopback());
        let mut client = connect(&server);
        client.write_all(b"viewer").unwrap();
        tick_until(&mut server, |s| s.session().subscriber_count() == 1);

        server.run(&AtomicBool::new(true));
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(server.session().subscriber_count(), 0);

        let mut text = String::new();
        client.read_to_string(&mut text).unwrap();
        assert_eq!(text, "Welcome to the \"Test\" Chat Server!\n");

        // A second shutdown is a no-op.
        server.shutdown();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn shutdown_flushes_queued_messages_first() {
        let mut server = test_server(RelayConfig::loopback());
        let viewer = connect(&server);
        (&viewer).write_all(b"viewer").unwrap();
        tick_until(&mut server, |s| s.session().subscriber_count() == 1);

        server.session.enqueue(tcp_chat_protocol::RelayMessage::Joined {
            name: "late".into(),
        });
        server.shutdown();

        let lines: Vec<String> = BufReader::new(viewer)
            .lines()
            .map(|line| line.unwrap())
            .collect();
        assert_eq!(
            lines,
            vec![
                "Welcome to the \"Test\" Chat Server!".to_string(),
                "late has joined the chat.".to_string(),
            ]
        );
    }

    #[test]
    fn handle_reports_state_and_stops() {
        let (handle, addr) = start_relay(RelayConfig::loopback()).unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(handle.state(), ServerState::Running);
        handle.stop();
    }
}
