// Chat session state for the relay.
//
// `Session` is the central data structure that `server.rs` drives once per
// tick. It owns the connection registry and the outbound message queue. All
// mutation happens from the server's single control-loop thread, so nothing
// here locks.
//
// Key responsibilities:
// - Handshake: classify a new connection's first payload (`admit`) and
//   register it as a viewer or a named messenger, or refuse it. Refused name
//   claims get a one-line notice before the socket is closed. Anything else
//   is closed silently.
// - Liveness: `reap_disconnected` runs one batched liveness scan over every
//   registered socket and removes the dead ones. Each departed messenger
//   queues exactly one "has left" notice. Viewers have nothing to say, so any
//   bytes they send are read and discarded first; otherwise unread input
//   would keep a closed viewer looking alive to the peek.
// - Intake: `collect_messages` reads whatever each messenger has sent, without
//   blocking, into that messenger's `LineBuffer`, and queues each complete
//   line tagged with the sender's name. A short read with no `\n` at all is
//   taken as one whole message. A bare `bye` line is a graceful leave.
// - Broadcast: `flush` drains the queue and writes every message, in order, to
//   every viewer registered at that moment.
//
// Write errors on a viewer are logged and that viewer is skipped for the rest
// of the flush. Nobody retries. The next tick's liveness scan reclaims the
// socket.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tcp_chat_protocol::{
    BYE_COMMAND, Handshake, HandshakeRejection, LineBuffer, RelayMessage, encode_line,
    rejection_notice, welcome_line,
};

use crate::config::RelayConfig;
use crate::error::RegistryError;
use crate::liveness::{self, ErrorPolicy};
use crate::net;
use crate::queue::MessageQueue;
use crate::registry::{ConnectionId, Registry, Removed};

/// Result of classifying a connection's handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Subscriber(ConnectionId),
    Publisher(ConnectionId),
    Rejected(HandshakeRejection),
}

/// Relay session for one chat room.
pub struct Session {
    pub chat_name: String,
    registry: Registry<TcpStream>,
    /// Unterminated input per messenger, carried between reads.
    partial: HashMap<ConnectionId, LineBuffer>,
    queue: MessageQueue,
    buffer_size: usize,
    write_timeout: Duration,
}

impl Session {
    pub fn new(chat_name: String, buffer_size: usize, write_timeout: Duration) -> Self {
        Self {
            chat_name,
            registry: Registry::new(),
            partial: HashMap::new(),
            queue: MessageQueue::new(),
            buffer_size: buffer_size.max(1),
            write_timeout,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.chat_name.clone(),
            config.buffer_size,
            config.write_timeout(),
        )
    }

    /// Classify a new connection by its first payload and register it.
    ///
    /// The session takes ownership of `stream` either way: registered on
    /// success, closed on rejection.
    pub fn admit(&mut self, stream: TcpStream, peer: SocketAddr, payload: &[u8]) -> Admission {
        if payload.is_empty() {
            return self.refuse(stream, peer, HandshakeRejection::NoPayload);
        }

        if let Err(error) = stream.set_write_timeout(Some(self.write_timeout)) {
            tracing::debug!(%peer, %error, "failed to set write timeout");
        }

        match Handshake::parse(payload) {
            Handshake::Viewer => {
                let mut stream = stream;
                let welcome = encode_line(&welcome_line(&self.chat_name));
                if let Err(error) = stream.write_all(&welcome) {
                    // Registered anyway; the next liveness scan decides.
                    tracing::warn!(%peer, %error, "failed to send welcome");
                }
                let id = self.registry.add_subscriber(stream);
                tracing::info!(%peer, conn = %id, "viewer registered");
                Admission::Subscriber(id)
            }
            Handshake::Messenger { name } => match self.registry.add_publisher(stream, &name) {
                Ok(id) => {
                    tracing::info!(%peer, conn = %id, %name, "messenger registered");
                    self.partial.insert(id, LineBuffer::new());
                    self.queue.enqueue(RelayMessage::Joined { name });
                    Admission::Publisher(id)
                }
                Err((stream, error)) => {
                    let reason = match error {
                        RegistryError::EmptyName => HandshakeRejection::EmptyName,
                        RegistryError::NameTaken(name) => HandshakeRejection::NameTaken(name),
                        RegistryError::InvalidName(name) => HandshakeRejection::InvalidName(name),
                    };
                    self.refuse(stream, peer, reason)
                }
            },
            Handshake::Unrecognized => {
                self.refuse(stream, peer, HandshakeRejection::Unrecognized)
            }
        }
    }

    fn refuse(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        reason: HandshakeRejection,
    ) -> Admission {
        reject_connection(stream, peer, &reason);
        Admission::Rejected(reason)
    }

    /// Run one liveness scan over every registered connection, bounded by
    /// `timeout` in total. Returns the ids that were removed.
    pub fn reap_disconnected(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let mut gone = self.discard_viewer_input();

        let (ids, streams): (Vec<ConnectionId>, Vec<&TcpStream>) = self
            .registry
            .all_ids()
            .into_iter()
            .filter(|id| !gone.contains(id))
            .filter_map(|id| self.registry.connection(id).map(|stream| (id, stream)))
            .unzip();
        let flags = liveness::scan(&streams, timeout, ErrorPolicy::AssumeDisconnected);

        gone.extend(
            ids.into_iter()
                .zip(flags)
                .filter_map(|(id, disconnected)| disconnected.then_some(id)),
        );
        for &id in &gone {
            self.disconnect(id);
        }
        gone
    }

    /// Read and drop anything viewers sent. Returns viewers found closed
    /// (EOF) or broken along the way.
    fn discard_viewer_input(&mut self) -> Vec<ConnectionId> {
        let mut buf = vec![0u8; self.buffer_size];
        let mut gone = Vec::new();

        for id in self.registry.subscriber_ids() {
            let Some(stream) = self.registry.connection_mut(id) else {
                continue;
            };
            match net::read_available(stream, &mut buf) {
                Ok(Some(0)) => gone.push(id),
                Ok(Some(n)) => tracing::debug!(conn = %id, bytes = n, "discarded viewer input"),
                Ok(None) => {}
                Err(error) => {
                    tracing::debug!(conn = %id, %error, "viewer read failed");
                    gone.push(id);
                }
            }
        }
        gone
    }

    /// Read pending input from every messenger and queue its complete lines.
    /// Returns how many chat messages were queued.
    pub fn collect_messages(&mut self) -> usize {
        let mut buf = vec![0u8; self.buffer_size];
        let mut queued = 0;

        for id in self.registry.publisher_ids() {
            let Some(stream) = self.registry.connection_mut(id) else {
                continue;
            };
            let n = match net::read_available(stream, &mut buf) {
                // EOF included: it completes whatever line is pending. The
                // liveness scan removes the connection afterwards.
                Ok(Some(n)) => n,
                Ok(None) => continue,
                Err(error) => {
                    tracing::debug!(conn = %id, %error, "messenger read failed");
                    continue;
                }
            };

            let Some(name) = self.registry.name(id).map(String::from) else {
                continue;
            };
            let chunk = &buf[..n];
            let pending = self.partial.entry(id).or_default();
            let mut lines = pending.push(chunk);
            // A short read without a terminator means nothing more of this
            // line is waiting: a raw single-write message, or EOF.
            if n < buf.len() && !chunk.contains(&b'\n') {
                lines.extend(pending.flush());
            }

            for text in lines {
                if text.is_empty() {
                    continue;
                }
                if text == BYE_COMMAND {
                    tracing::debug!(conn = %id, %name, "messenger said bye");
                    self.disconnect(id);
                    break;
                }
                self.queue.enqueue(RelayMessage::Chat {
                    name: name.clone(),
                    text,
                });
                queued += 1;
            }
        }
        queued
    }

    /// Queue a message for the next flush.
    pub fn enqueue(&mut self, message: RelayMessage) {
        self.queue.enqueue(message);
    }

    /// Drain the queue and write each message, in order, to every current
    /// viewer. Returns how many messages were broadcast.
    pub fn flush(&mut self) -> usize {
        let batch = self.queue.drain();
        if batch.is_empty() {
            return 0;
        }

        let mut failed: HashSet<ConnectionId> = HashSet::new();
        for message in &batch {
            let line = encode_line(&message.to_string());
            for (id, stream) in self.registry.subscribers_mut() {
                if failed.contains(&id) {
                    continue;
                }
                if let Err(error) = stream.write_all(&line) {
                    tracing::warn!(conn = %id, %error, "broadcast write failed");
                    failed.insert(id);
                }
            }
        }
        tracing::debug!(
            messages = batch.len(),
            viewers = self.registry.subscriber_count(),
            failed = failed.len(),
            "flushed"
        );
        batch.len()
    }

    /// Remove a connection, close it, and announce a departing messenger.
    /// An unterminated line the messenger left behind goes out before the
    /// notice. Unknown ids are ignored.
    pub fn disconnect(&mut self, id: ConnectionId) {
        match self.registry.remove(id) {
            Some(Removed::Publisher { name, conn }) => {
                tracing::info!(conn = %id, %name, "messenger left");
                net::close(conn);
                let rest = self
                    .partial
                    .remove(&id)
                    .and_then(|mut pending| pending.flush());
                if let Some(text) = rest.filter(|t| !t.is_empty() && t.as_str() != BYE_COMMAND) {
                    self.queue.enqueue(RelayMessage::Chat {
                        name: name.clone(),
                        text,
                    });
                }
                self.queue.enqueue(RelayMessage::Left { name });
            }
            Some(Removed::Subscriber { conn }) => {
                tracing::info!(conn = %id, "viewer left");
                net::close(conn);
            }
            None => {}
        }
    }

    /// Close every registered connection. Used on shutdown; no notices are
    /// queued since nobody is left to receive them.
    pub fn close_all(&mut self) {
        self.partial.clear();
        for removed in self.registry.drain() {
            net::close(removed.into_connection());
        }
    }

    pub fn publisher_count(&self) -> usize {
        self.registry.publisher_count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }

    /// Names of connected messengers, in join order.
    pub fn publisher_names(&self) -> Vec<String> {
        self.registry.publisher_names()
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }
}

/// Close a connection that failed its handshake. Name claims are told why
/// first; everything else is closed without a reply.
pub fn reject_connection(stream: TcpStream, peer: SocketAddr, reason: &HandshakeRejection) {
    tracing::warn!(%peer, %reason, "handshake rejected");
    let mut stream = stream;
    if reason.notifies_peer() {
        let notice = encode_line(&rejection_notice(reason));
        if let Err(error) = stream.write_all(&notice) {
            tracing::debug!(%peer, %error, "failed to send rejection notice");
        }
    }
    net::close(stream);
}
