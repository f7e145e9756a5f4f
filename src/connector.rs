//! Sequential connection attempts over a list of candidate addresses.
//!
//! Per attempt the connector walks this state machine:
//!
//! ```text
//! Idle ─► Connecting(0) ─┬─► Connected
//!                         ├─► Connecting(1) ─► ... ─► Connecting(n-1)
//!                         └─► Exhausted
//! ```
//!
//! Candidates are tried strictly one at a time, in resolver order, all on
//! the same port. Only the exhaustion of every candidate is an error.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{Result, SessionError};
use crate::transport::Transport;

/// Where a connection attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    /// No attempt made yet.
    Idle,
    /// Attempting the candidate with this zero-based index.
    Connecting(usize),
    /// A connection is live.
    Connected,
    /// Every candidate failed.
    Exhausted,
}

/// Ordered candidates for one lookup, consumed from the front.
#[derive(Debug, Clone)]
pub struct CandidateList {
    addrs: VecDeque<IpAddr>,
    port: u16,
}

impl CandidateList {
    /// Create a list of candidates sharing one port.
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>, port: u16) -> Self {
        Self {
            addrs: addrs.into_iter().collect(),
            port,
        }
    }

    /// Remove and return the next candidate.
    pub fn next_addr(&mut self) -> Option<SocketAddr> {
        self.addrs
            .pop_front()
            .map(|ip| SocketAddr::new(ip, self.port))
    }

    /// Candidates not tried yet.
    pub fn remaining(&self) -> usize {
        self.addrs.len()
    }

    /// Check if no candidates are left.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Target port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// A successful connection together with the address that accepted it.
#[derive(Debug)]
pub struct Connected<C> {
    /// The live connection.
    pub conn: C,
    /// Candidate that accepted.
    pub addr: SocketAddr,
    /// Number of attempts made, including the successful one.
    pub attempts: usize,
}

/// Tries candidates one after another until one connects.
pub struct AddressFallbackConnector<'a, T> {
    transport: &'a T,
    connect_timeout: Option<Duration>,
    state: ConnectState,
}

impl<'a, T: Transport> AddressFallbackConnector<'a, T> {
    /// Create a connector over `transport`.
    pub fn new(transport: &'a T) -> Self {
        Self {
            transport,
            connect_timeout: None,
            state: ConnectState::Idle,
        }
    }

    /// Give up on a single candidate after `timeout`.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Current state.
    pub fn state(&self) -> ConnectState {
        self.state
    }

    /// Walk `candidates` until one accepts.
    ///
    /// Returns `NoReachableAddress` once every candidate failed (or if the
    /// list was empty to begin with).
    pub async fn connect(&mut self, mut candidates: CandidateList) -> Result<Connected<T::Conn>> {
        let mut attempts = 0;
        let mut last_error = String::from("no candidate addresses");

        while let Some(addr) = candidates.next_addr() {
            self.state = ConnectState::Connecting(attempts);
            attempts += 1;
            tracing::debug!(
                "Connecting to {} (attempt {}, {} left)",
                addr,
                attempts,
                candidates.remaining()
            );

            match self.attempt(addr).await {
                Ok(conn) => {
                    self.state = ConnectState::Connected;
                    tracing::debug!("Connected to {}", addr);
                    return Ok(Connected {
                        conn,
                        addr,
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = format!("{}: {}", addr, e);
                }
            }
        }

        self.state = ConnectState::Exhausted;
        tracing::warn!("No reachable address after {} attempts", attempts);
        Err(SessionError::NoReachableAddress {
            attempts,
            last_error,
        })
    }

    async fn attempt(&self, addr: SocketAddr) -> std::io::Result<T::Conn> {
        match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.transport.connect(addr))
                .await
                .map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
                })?,
            None => self.transport.connect(addr).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    /// Connection stand-in; the connector never touches it.
    #[derive(Debug)]
    struct NullConn(SocketAddr);

    impl crate::transport::Connection for NullConn {
        async fn readable(&self) -> io::Result<()> {
            std::future::pending().await
        }

        fn try_read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }

        async fn writable(&self) -> io::Result<()> {
            Ok(())
        }

        fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn peer_addr(&self) -> io::Result<SocketAddr> {
            Ok(self.0)
        }
    }

    /// Accepts only the listed addresses, records every attempt.
    struct ScriptedTransport {
        accept: Vec<IpAddr>,
        hang: Vec<IpAddr>,
        attempts: Mutex<Vec<SocketAddr>>,
    }

    impl ScriptedTransport {
        fn accepting(accept: &[IpAddr]) -> Self {
            Self {
                accept: accept.to_vec(),
                hang: Vec::new(),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<SocketAddr> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        type Conn = NullConn;

        async fn connect(&self, addr: SocketAddr) -> io::Result<NullConn> {
            self.attempts.lock().unwrap().push(addr);
            if self.hang.contains(&addr.ip()) {
                std::future::pending::<()>().await;
            }
            if self.accept.contains(&addr.ip()) {
                Ok(NullConn(addr))
            } else {
                Err(io::ErrorKind::ConnectionRefused.into())
            }
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_candidate_list_front_to_back() {
        let mut list = CandidateList::new([ip(1), ip(2)], 5672);
        assert_eq!(list.remaining(), 2);
        assert_eq!(list.next_addr(), Some(SocketAddr::new(ip(1), 5672)));
        assert_eq!(list.next_addr(), Some(SocketAddr::new(ip(2), 5672)));
        assert_eq!(list.next_addr(), None);
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_first_candidate_wins() {
        let transport = ScriptedTransport::accepting(&[ip(1), ip(2)]);
        let mut connector = AddressFallbackConnector::new(&transport);
        assert_eq!(connector.state(), ConnectState::Idle);

        let connected = connector
            .connect(CandidateList::new([ip(1), ip(2)], 5672))
            .await
            .unwrap();

        assert_eq!(connected.addr, SocketAddr::new(ip(1), 5672));
        assert_eq!(connected.attempts, 1);
        assert_eq!(transport.attempts().len(), 1);
        assert_eq!(connector.state(), ConnectState::Connected);
    }

    #[tokio::test]
    async fn test_only_last_candidate_succeeds() {
        let candidates = [ip(1), ip(2), ip(3), ip(4)];
        let transport = ScriptedTransport::accepting(&[ip(4)]);
        let mut connector = AddressFallbackConnector::new(&transport);

        let connected = connector
            .connect(CandidateList::new(candidates, 5672))
            .await
            .unwrap();

        let expected: Vec<SocketAddr> = candidates
            .iter()
            .map(|ip| SocketAddr::new(*ip, 5672))
            .collect();
        assert_eq!(transport.attempts(), expected);
        assert_eq!(connected.attempts, 4);
        assert_eq!(connected.conn.0, SocketAddr::new(ip(4), 5672));
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let transport = ScriptedTransport::accepting(&[]);
        let mut connector = AddressFallbackConnector::new(&transport);

        let err = connector
            .connect(CandidateList::new([ip(1), ip(2), ip(3)], 80))
            .await
            .unwrap_err();

        match err {
            SessionError::NoReachableAddress { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.starts_with("10.0.0.3:80"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.attempts().len(), 3);
        assert_eq!(connector.state(), ConnectState::Exhausted);
    }

    #[tokio::test]
    async fn test_empty_list_is_exhausted() {
        let transport = ScriptedTransport::accepting(&[ip(1)]);
        let mut connector = AddressFallbackConnector::new(&transport);

        let result = connector.connect(CandidateList::new([], 80)).await;

        assert!(matches!(
            result,
            Err(SessionError::NoReachableAddress { attempts: 0, .. })
        ));
        assert!(transport.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_candidate_is_skipped() {
        let mut transport = ScriptedTransport::accepting(&[ip(2)]);
        transport.hang.push(ip(1));
        let mut connector = AddressFallbackConnector::new(&transport)
            .connect_timeout(Some(Duration::from_secs(3)));

        let connected = connector
            .connect(CandidateList::new([ip(1), ip(2)], 5672))
            .await
            .unwrap();

        assert_eq!(connected.addr.ip(), ip(2));
        assert_eq!(transport.attempts().len(), 2);
    }
}
