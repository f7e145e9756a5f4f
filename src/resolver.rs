//! Hostname resolution.
//!
//! A [`Resolver`] turns a hostname into an ordered list of candidate IP
//! addresses. Order matters: the connector tries candidates front to back.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::IpAddr;

/// Resolves hostnames to candidate addresses.
pub trait Resolver: Send + Sync + 'static {
    /// Resolve `host` to candidate addresses in preference order.
    ///
    /// An empty list is a valid answer; the session treats it as a failure.
    fn resolve(&self, host: &str) -> impl Future<Output = io::Result<Vec<IpAddr>>> + Send;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let mut addrs: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((host, 0)).await? {
            // getaddrinfo repeats addresses once per socket type
            if !addrs.contains(&addr.ip()) {
                addrs.push(addr.ip());
            }
        }
        Ok(addrs)
    }
}

/// Resolver answering from a fixed table.
///
/// Useful for pinned hosts and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the addresses for `host`.
    pub fn host(mut self, host: &str, addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        self.hosts
            .insert(host.to_ascii_lowercase(), addrs.into_iter().collect());
        self
    }
}

impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("unknown host {}", host))
            })
    }
}
