//! TCP transport on top of `tokio::net`.
//!
//! # Example
//!
//! ```ignore
//! use sessionwire::transport::{Connection, TcpTransport, Transport};
//!
//! let transport = TcpTransport::new();
//! let conn = transport.connect("127.0.0.1:5672".parse()?).await?;
//! conn.writable().await?;
//! let written = conn.try_write(b"hello")?;
//! ```

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpSocket, TcpStream};

use super::{Connection, Transport};

/// Opens plain TCP connections.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    nodelay: bool,
}

impl TcpTransport {
    /// Create a transport with `TCP_NODELAY` enabled.
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    /// Enable or disable `TCP_NODELAY` on new connections.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    type Conn = TcpStream;

    async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_nodelay(self.nodelay)?;
        socket.connect(addr).await
    }
}

impl Connection for TcpStream {
    async fn readable(&self) -> io::Result<()> {
        TcpStream::readable(self).await
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    async fn writable(&self) -> io::Result<()> {
        TcpStream::writable(self).await
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}
