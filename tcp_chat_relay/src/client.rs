// TCP clients for the chat relay: `Messenger` (publisher) and `Viewer`
// (subscriber).
//
// Both run the same two-phase handshake. First they connect and send the role
// claim. Then they wait briefly (`confirm_timeout`) to see whether the relay
// closed the socket or answered with a rejection notice. Silence means the
// claim was accepted. A viewer's welcome line usually arrives inside that
// window and is kept for the first `poll()`.
//
// Everything after the handshake is non-blocking and driven by the caller's
// own tick loop (see `bin/messenger.rs` and `bin/viewer.rs`). Liveness uses the
// optimistic `AssumeConnected` policy. A transient I/O error never ends a
// session on its own. Only a confirmed close does.
//
// Messenger payloads go out one line at a time (`encode_line`), so chat
// typed faster than the relay ticks still arrives as separate messages.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tcp_chat_protocol::{
    BYE_COMMAND, Handshake, LineBuffer, encode_line, parse_rejection,
};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::liveness::{self, ErrorPolicy};
use crate::net;

/// Local commands that end a messenger session.
const QUIT_COMMANDS: [&str; 2] = ["quit", "exit"];

/// What `Messenger::submit` did with a line of user input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    Sent,
    /// Blank input; nothing was sent.
    Skipped,
    /// The user asked to leave; `bye` was sent and the socket closed.
    Quit,
}

/// Connect and apply socket options shared by both clients.
fn open(addr: SocketAddr, config: &ClientConfig) -> Result<TcpStream, ClientError> {
    let stream =
        TcpStream::connect(addr).map_err(|source| ClientError::connect_failed(addr, source))?;
    if let Err(error) = net::set_buffer_sizes(&stream, config.buffer_size) {
        tracing::debug!(%addr, %error, "failed to set socket buffers");
    }
    Ok(stream)
}

/// Wait up to `timeout` for the relay's first reply to a role claim.
///
/// Returns the bytes read, or `None` if the relay stayed silent. A close is a
/// rejection; a rejection notice in the reply carries its reason.
fn await_reply(
    stream: &mut TcpStream,
    timeout: Duration,
    buf: &mut [u8],
) -> Result<Option<usize>, ClientError> {
    stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
    let result = stream.read(buf);
    stream.set_read_timeout(None)?;

    match result {
        Ok(0) => Err(ClientError::HandshakeRejected(None)),
        Ok(n) => {
            let text = String::from_utf8_lossy(&buf[..n]);
            match text.lines().find_map(parse_rejection) {
                Some(reason) => Err(ClientError::HandshakeRejected(Some(reason))),
                None => Ok(Some(n)),
            }
        }
        Err(ref e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            Ok(None)
        }
        Err(error) => Err(ClientError::Transient(error)),
    }
}

/// A named publisher connection.
pub struct Messenger {
    stream: TcpStream,
    name: String,
    config: ClientConfig,
    closed: bool,
}

impl Messenger {
    /// Connect, claim `name`, and confirm the relay kept us.
    pub fn connect(addr: SocketAddr, name: &str, config: ClientConfig) -> Result<Self, ClientError> {
        let mut stream = open(addr, &config)?;
        let claim = Handshake::Messenger {
            name: name.to_string(),
        };
        stream.write_all(&claim.encode())?;

        let mut buf = vec![0u8; config.buffer_size.max(1)];
        if let Err(error) = await_reply(&mut stream, config.confirm_timeout, &mut buf) {
            net::close(stream);
            return Err(error);
        }

        tracing::info!(%addr, %name, "joined chat");
        Ok(Self {
            stream,
            name: name.to_string(),
            config,
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one chat message. Blank text is sent as-is; callers that take
    /// raw user input should go through `submit`.
    pub fn send(&mut self, text: &str) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::PeerDisconnected);
        }
        self.stream.write_all(&encode_line(text))?;
        Ok(())
    }

    /// Handle one line of user input: skip blanks, leave on `quit`/`exit`,
    /// send anything else.
    pub fn submit(&mut self, input: &str) -> Result<Submission, ClientError> {
        let text = input.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return Ok(Submission::Skipped);
        }
        if QUIT_COMMANDS
            .iter()
            .any(|command| text.trim().eq_ignore_ascii_case(command))
        {
            self.disconnect();
            return Ok(Submission::Quit);
        }
        self.send(text)?;
        Ok(Submission::Sent)
    }

    /// False once the relay has closed our connection, or we closed it.
    pub fn is_connected(&self) -> bool {
        !self.closed
            && !liveness::is_disconnected(
                &self.stream,
                self.config.liveness_timeout,
                ErrorPolicy::AssumeConnected,
            )
    }

    /// Say `bye` and close. Idempotent.
    pub fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = self.stream.write_all(&encode_line(BYE_COMMAND)) {
            tracing::debug!(%error, "failed to send bye");
        }
        if let Err(error) = self.stream.shutdown(std::net::Shutdown::Both) {
            tracing::debug!(%error, "shutdown failed");
        }
        tracing::info!(name = %self.name, "left chat");
    }
}

/// A read-only subscriber connection.
pub struct Viewer {
    stream: TcpStream,
    lines: LineBuffer,
    buf: Vec<u8>,
    /// Lines that arrived during the handshake.
    backlog: Vec<String>,
    config: ClientConfig,
    closed: bool,
}

impl Viewer {
    pub fn connect(addr: SocketAddr, config: ClientConfig) -> Result<Self, ClientError> {
        let mut stream = open(addr, &config)?;
        stream.write_all(&Handshake::Viewer.encode())?;

        let mut buf = vec![0u8; config.buffer_size.max(1)];
        let mut lines = LineBuffer::new();
        let backlog = match await_reply(&mut stream, config.confirm_timeout, &mut buf) {
            Ok(Some(n)) => lines.push(&buf[..n]),
            Ok(None) => Vec::new(),
            Err(error) => {
                net::close(stream);
                return Err(error);
            }
        };

        tracing::info!(%addr, "watching chat");
        Ok(Self {
            stream,
            lines,
            buf,
            backlog,
            config,
            closed: false,
        })
    }

    /// Collect every complete line that has arrived, without blocking.
    ///
    /// Returns `PeerDisconnected` once there is nothing left to read and the
    /// relay has gone away.
    pub fn poll(&mut self) -> Result<Vec<String>, ClientError> {
        let mut received = std::mem::take(&mut self.backlog);
        while !self.closed {
            match net::read_available(&mut self.stream, &mut self.buf) {
                Ok(Some(0)) => {
                    self.closed = true;
                    received.extend(self.lines.flush());
                }
                Ok(Some(n)) => received.extend(self.lines.push(&self.buf[..n])),
                Ok(None) => break,
                Err(error) => {
                    tracing::debug!(%error, "viewer read failed");
                    break;
                }
            }
        }

        if received.is_empty()
            && (self.closed
                || liveness::is_disconnected(
                    &self.stream,
                    self.config.liveness_timeout,
                    ErrorPolicy::AssumeConnected,
                ))
        {
            return Err(ClientError::PeerDisconnected);
        }
        Ok(received)
    }

    pub fn disconnect(self) {
        net::close(self.stream);
        tracing::info!("stopped watching chat");
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufRead;
    use std::io::BufReader;
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn fast_config() -> ClientConfig {
        ClientConfig {
            confirm_timeout: Duration::from_millis(100),
            ..ClientConfig::default()
        }
    }

    /// A one-connection fake relay: runs `serve` on the accepted socket.
    fn fake_relay(
        serve: impl FnOnce(TcpStream) + Send + 'static,
    ) -> (SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            serve(stream);
        });
        (addr, handle)
    }

    fn read_claim(stream: &mut TcpStream) -> String {
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn connect_to_closed_port_fails() {
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let Err(err) = Messenger::connect(addr, "alice", fast_config()) else {
            panic!("connect to a closed port succeeded");
        };
        assert!(matches!(err, ClientError::ConnectFailed { .. }));
    }

    #[test]
    fn messenger_rejected_with_reason() {
        let (addr, relay) = fake_relay(|mut stream| {
            assert_eq!(read_claim(&mut stream), "name:alice");
            stream
                .write_all(b"rejected: name \"alice\" is already taken\n")
                .unwrap();
        });

        let Err(err) = Messenger::connect(addr, "alice", fast_config()) else {
            panic!("expected rejection");
        };
        match err {
            ClientError::HandshakeRejected(Some(reason)) => {
                assert_eq!(reason, "name \"alice\" is already taken");
            }
            other => panic!("unexpected {other:?}"),
        }
        relay.join().unwrap();
    }

    #[test]
    fn messenger_rejected_by_close() {
        let (addr, relay) = fake_relay(|mut stream| {
            read_claim(&mut stream);
        });
        let Err(err) = Messenger::connect(addr, "x", fast_config()) else {
            panic!("expected rejection");
        };
        assert!(matches!(err, ClientError::HandshakeRejected(None)));
        relay.join().unwrap();
    }

    #[test]
    fn messenger_sends_lines_and_bye() {
        let (addr, relay) = fake_relay(|mut stream| {
            assert_eq!(read_claim(&mut stream), "name:alice");
            let lines: Vec<String> = BufReader::new(stream)
                .lines()
                .map(|line| line.unwrap())
                .collect();
            assert_eq!(lines, vec!["hi", "second", "bye"]);
        });

        let mut messenger = Messenger::connect(addr, "alice", fast_config()).unwrap();
        assert_eq!(messenger.name(), "alice");
        assert!(messenger.is_connected());
        assert_eq!(messenger.submit("hi\n").unwrap(), Submission::Sent);
        assert_eq!(messenger.submit("   ").unwrap(), Submission::Skipped);
        assert_eq!(messenger.submit("second").unwrap(), Submission::Sent);
        assert_eq!(messenger.submit("QUIT").unwrap(), Submission::Quit);
        assert!(!messenger.is_connected());
        assert!(matches!(
            messenger.send("late"),
            Err(ClientError::PeerDisconnected)
        ));
        relay.join().unwrap();
    }

    #[test]
    fn messenger_notices_server_close() {
        let (addr, relay) = fake_relay(|mut stream| {
            read_claim(&mut stream);
            thread::sleep(Duration::from_millis(200));
        });

        let messenger = Messenger::connect(addr, "alice", fast_config()).unwrap();
        relay.join().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!messenger.is_connected());
    }

    #[test]
    fn viewer_reassembles_split_lines() {
        let (addr, relay) = fake_relay(|mut stream| {
            assert_eq!(read_claim(&mut stream), "viewer");
            stream.write_all(b"Welcome to the \"T\" Chat Server!\n").unwrap();
            thread::sleep(Duration::from_millis(150));
            stream.write_all(b"alice: he").unwrap();
            thread::sleep(Duration::from_millis(50));
            stream.write_all(b"llo\nbob has joined").unwrap();
            stream.write_all(b" the chat.\n").unwrap();
            thread::sleep(Duration::from_millis(100));
        });

        let mut viewer = Viewer::connect(addr, fast_config()).unwrap();
        let mut lines = Vec::new();
        loop {
            match viewer.poll() {
                Ok(batch) => lines.extend(batch),
                Err(ClientError::PeerDisconnected) => break,
                Err(other) => panic!("unexpected {other:?}"),
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(
            lines,
            vec![
                "Welcome to the \"T\" Chat Server!",
                "alice: hello",
                "bob has joined the chat.",
            ]
        );
        viewer.disconnect();
        relay.join().unwrap();
    }

    #[test]
    fn viewer_rejected_by_close() {
        let (addr, relay) = fake_relay(|mut stream| {
            read_claim(&mut stream);
        });
        let Err(err) = Viewer::connect(addr, fast_config()) else {
            panic!("expected rejection");
        };
        assert!(matches!(err, ClientError::HandshakeRejected(None)));
        relay.join().unwrap();
    }
}
