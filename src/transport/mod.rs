//! Transport module - the byte stream a session runs over.
//!
//! A [`Transport`] opens [`Connection`]s; a connection offers readiness
//! notifications plus non-blocking read and write primitives. Closing a
//! connection is dropping it.
//!
//! [`TcpTransport`] is the tokio TCP implementation.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

mod tcp;

pub use tcp::TcpTransport;

/// Opens connections to a single socket address.
///
/// A failure before the connect is even in flight (e.g. socket creation) and
/// a refused or unreachable connect are both plain `Err` results: the
/// connector treats them the same way.
pub trait Transport: Send + Sync + 'static {
    /// The live connection type.
    type Conn: Connection;

    /// Connect to `addr`.
    fn connect(&self, addr: SocketAddr) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// A live, non-blocking byte stream.
pub trait Connection: Send + Sync + 'static {
    /// Wait until the connection may have data to read.
    fn readable(&self) -> impl Future<Output = io::Result<()>> + Send;

    /// Read without blocking. `Ok(0)` means the peer closed the stream;
    /// `ErrorKind::WouldBlock` means the readiness was spurious.
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait until the connection may accept more bytes.
    fn writable(&self) -> impl Future<Output = io::Result<()>> + Send;

    /// Write without blocking, returning how many bytes were accepted.
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Address of the remote end.
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}
