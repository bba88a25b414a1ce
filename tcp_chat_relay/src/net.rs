// Socket helpers shared by the relay and the clients.
//
// All chat sockets stay in blocking mode. Reads that must not block
// (publisher intake, viewer polling, pending handshakes) go through
// `read_available`, which flips the socket to non-blocking for the one call.
// Writes stay blocking and rely on small messages fitting the socket buffer,
// bounded by a write timeout on the relay side.

use std::io::{self, Read};
use std::net::{Shutdown, TcpStream};

/// Set send/receive buffer sizes on a connected socket.
#[cfg(unix)]
pub fn set_buffer_sizes(stream: &TcpStream, size: usize) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let value = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);
    let len = libc::socklen_t::try_from(std::mem::size_of::<libc::c_int>())
        .unwrap_or(libc::socklen_t::MAX);
    for option in [libc::SO_SNDBUF, libc::SO_RCVBUF] {
        // SAFETY: the fd is owned by `stream`, which outlives the call, and
        // the option value pointer refers to a live `c_int` of length `len`.
        let rc = unsafe {
            libc::setsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                option,
                (&value as *const libc::c_int).cast(),
                len,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// `std` exposes no buffer-size setters; elsewhere the OS defaults stay.
#[cfg(not(unix))]
pub fn set_buffer_sizes(_stream: &TcpStream, _size: usize) -> io::Result<()> {
    Ok(())
}

/// Read whatever is already buffered, without waiting.
///
/// Returns `Ok(None)` if nothing is available yet, `Ok(Some(0))` on EOF, and
/// `Ok(Some(n))` for `n` bytes read into `buf`.
pub fn read_available(stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<Option<usize>> {
    match with_nonblocking(stream, |mut s| s.read(buf)) {
        Ok(n) => Ok(Some(n)),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Run `op` with the socket switched to non-blocking mode, then switch it
/// back. Failing to restore blocking mode is logged; `op`'s own result is
/// always what the caller gets.
pub fn with_nonblocking<T>(
    stream: &TcpStream,
    op: impl FnOnce(&TcpStream) -> io::Result<T>,
) -> io::Result<T> {
    stream.set_nonblocking(true)?;
    let result = op(stream);
    if let Err(error) = stream.set_nonblocking(false) {
        tracing::debug!(%error, "failed to restore blocking mode");
    }
    result
}

/// Shut both directions down and release the socket. Errors are irrelevant
/// here: the peer may already be gone.
pub fn close(stream: TcpStream) {
    let _ = stream.shutdown(Shutdown::Both);
}
