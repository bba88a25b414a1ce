// Liveness detector: has the peer on this socket gone away?
//
// A disconnected TCP peer shows up as a socket that is "readable" but yields
// zero bytes. The check therefore has two stages:
// 1. Wait, bounded by `timeout`, for any of the sockets to become readable.
//    On unix this is one `poll(2)` over the whole set, so a scan of N idle
//    connections costs at most one timeout, not N of them.
// 2. For each readable socket, `peek` one byte without blocking. `Ok(0)` means
//    the peer closed. Data is only peeked, never consumed, so a messenger's
//    pending chat text is still there for the session to read afterwards.
//
// I/O errors are resolved by an `ErrorPolicy`. The relay uses
// `AssumeDisconnected` so dead slots are reclaimed aggressively. Clients use
// `AssumeConnected` and ride out transient errors instead of tearing down a
// healthy session.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use crate::net;

/// How to read an I/O error during a liveness check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Server side: an error means the slot is dead.
    AssumeDisconnected,
    /// Client side: an error is transient; keep going.
    AssumeConnected,
}

impl ErrorPolicy {
    fn disconnected_on_error(self) -> bool {
        matches!(self, ErrorPolicy::AssumeDisconnected)
    }
}

/// Check a single connection.
pub fn is_disconnected(stream: &TcpStream, timeout: Duration, policy: ErrorPolicy) -> bool {
    scan(&[stream], timeout, policy)
        .first()
        .copied()
        .unwrap_or_else(|| policy.disconnected_on_error())
}

/// Check a set of connections with one shared bounded wait. Returns one flag
/// per input stream, in order: `true` if that peer is gone.
pub fn scan(streams: &[&TcpStream], timeout: Duration, policy: ErrorPolicy) -> Vec<bool> {
    if streams.is_empty() {
        return Vec::new();
    }

    let readable = match wait_readable(streams, timeout) {
        Ok(readable) => readable,
        Err(error) => {
            tracing::debug!(%error, count = streams.len(), "liveness poll failed");
            return vec![policy.disconnected_on_error(); streams.len()];
        }
    };

    streams
        .iter()
        .zip(readable)
        .map(|(stream, ready)| ready && peer_closed(stream, policy))
        .collect()
}

/// Peek one byte without blocking. A zero-byte result is an orderly close.
fn peer_closed(stream: &TcpStream, policy: ErrorPolicy) -> bool {
    match peek_nonblocking(stream) {
        Ok(Some(0)) => true,
        Ok(_) => false,
        Err(error) => {
            tracing::debug!(%error, ?policy, "liveness peek failed");
            policy.disconnected_on_error()
        }
    }
}

fn peek_nonblocking(stream: &TcpStream) -> io::Result<Option<usize>> {
    let mut probe = [0u8; 1];
    match net::with_nonblocking(stream, |s| s.peek(&mut probe)) {
        Ok(n) => Ok(Some(n)),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Wait up to `timeout` for readability (data, EOF, or error) on any stream.
#[cfg(unix)]
fn wait_readable(streams: &[&TcpStream], timeout: Duration) -> io::Result<Vec<bool>> {
    use std::os::fd::AsRawFd;

    let mut fds: Vec<libc::pollfd> = streams
        .iter()
        .map(|stream| libc::pollfd {
            fd: stream.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    let nfds = libc::nfds_t::try_from(fds.len()).unwrap_or(libc::nfds_t::MAX);

    // SAFETY: `fds` is an initialized buffer of `nfds` pollfd structs that
    // stays alive for the duration of the call, and every fd belongs to a
    // borrowed, open `TcpStream`.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), nfds, timeout_ms) };
    if rc < 0 {
        let error = io::Error::last_os_error();
        if error.kind() == io::ErrorKind::Interrupted {
            return Ok(vec![false; fds.len()]);
        }
        return Err(error);
    }

    let ready = libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
    Ok(fds.iter().map(|fd| fd.revents & ready != 0).collect())
}

/// Without `poll`, every stream goes straight to the non-blocking peek.
#[cfg(not(unix))]
fn wait_readable(streams: &[&TcpStream], _timeout: Duration) -> io::Result<Vec<bool>> {
    Ok(vec![true; streams.len()])
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    use super::*;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    const WAIT: Duration = Duration::from_millis(50);

    #[test]
    fn idle_connection_is_alive() {
        let (_client, server) = tcp_pair();
        assert!(!is_disconnected(&server, WAIT, ErrorPolicy::AssumeDisconnected));
    }

    #[test]
    fn closed_peer_is_detected() {
        let (client, server) = tcp_pair();
        drop(client);
        // The FIN may take a moment on loopback; poll waits for it.
        assert!(is_disconnected(&server, Duration::from_secs(1), ErrorPolicy::AssumeDisconnected));
    }

    #[test]
    fn pending_data_is_not_consumed() {
        let (mut client, mut server) = tcp_pair();
        client.write_all(b"hello").unwrap();
        client.flush().unwrap();

        assert!(!is_disconnected(&server, Duration::from_secs(1), ErrorPolicy::AssumeDisconnected));

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn data_then_close_reads_as_alive_until_drained() {
        let (mut client, mut server) = tcp_pair();
        client.write_all(b"last words").unwrap();
        drop(client);
        std::thread::sleep(WAIT);

        assert!(!is_disconnected(&server, WAIT, ErrorPolicy::AssumeDisconnected));
        let mut buf = Vec::new();
        server.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"last words");
        assert!(is_disconnected(&server, WAIT, ErrorPolicy::AssumeDisconnected));
    }

    #[test]
    fn scan_reports_each_stream_in_order() {
        let (client_a, server_a) = tcp_pair();
        let (_client_b, server_b) = tcp_pair();
        let (client_c, server_c) = tcp_pair();
        drop(client_a);
        drop(client_c);
        std::thread::sleep(WAIT);

        let flags = scan(
            &[&server_a, &server_b, &server_c],
            WAIT,
            ErrorPolicy::AssumeDisconnected,
        );
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn scan_of_nothing_returns_immediately() {
        let started = Instant::now();
        assert!(scan(&[], Duration::from_secs(5), ErrorPolicy::AssumeDisconnected).is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn idle_scan_is_bounded_by_one_timeout() {
        let pairs: Vec<_> = (0..5).map(|_| tcp_pair()).collect();
        let servers: Vec<&TcpStream> = pairs.iter().map(|(_, server)| server).collect();

        let started = Instant::now();
        let flags = scan(&servers, WAIT, ErrorPolicy::AssumeDisconnected);
        assert_eq!(flags, vec![false; 5]);
        // Five sequential waits would take 250 ms.
        assert!(started.elapsed() < WAIT * 4);
    }

    #[test]
    fn stream_stays_blocking_after_check() {
        let (mut client, mut server) = tcp_pair();
        assert!(!is_disconnected(&server, WAIT, ErrorPolicy::AssumeConnected));

        // A blocking read with a timeout waits instead of failing with
        // WouldBlock straight away.
        server.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(WAIT);
            client.write_all(b"x").unwrap();
            client
        });
        let mut buf = [0u8; 1];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");
        drop(writer.join().unwrap());
    }
}
