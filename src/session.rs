//! Session builder and handle.
//!
//! A [`Session`] is one codec bound to (at most) one transport connection.
//! [`SessionBuilder`] collects the collaborators and configuration; calling
//! [`connect`](SessionBuilder::connect) spawns the session's driver task and
//! returns a cheap, cloneable handle immediately. Lifecycle:
//!
//! 1. Resolve the hostname (skipped for literal addresses)
//! 2. Try each candidate address in order until one accepts
//! 3. Feed incoming bytes through the codec, write what it emits
//! 4. Stop on the codec's `closed`, on any unrecoverable error, or on a
//!    `close()` that arrives before a connection exists
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sessionwire::{NoopListener, Session};
//! use sessionwire::protocol::FrameCodec;
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::builder(FrameCodec::new(), Arc::new(NoopListener))
//!         .connect_timeout(std::time::Duration::from_secs(2))
//!         .connect("broker.local", 5672);
//!
//!     session.close();
//!     println!("finished as {:?}", session.wait_terminal().await);
//! }
//! ```

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};

use crate::backpressure::{OutputPressure, DEFAULT_HIGH_WATERMARK};
use crate::codec::{Codec, CodecEvents};
use crate::driver::Driver;
use crate::error::{Result, SessionError};
use crate::listener::SessionListener;
use crate::reassembly::DEFAULT_CAPACITY;
use crate::resolver::{Resolver, SystemResolver};
use crate::transport::{TcpTransport, Transport};

/// Default size of the buffer each transport read lands in.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default backpressure timeout in milliseconds.
pub const DEFAULT_BACKPRESSURE_TIMEOUT_MS: u64 = 5_000;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the resolver.
    Resolving,
    /// Trying candidate addresses.
    Connecting,
    /// Transport live, codec handshake pending.
    Established,
    /// Codec reported connected.
    Ready,
    /// Close handshake in progress.
    Closing,
    /// Close handshake completed, or cancelled before a transport existed.
    Closed,
    /// Unrecoverable error; the session cannot be used any more.
    Failed,
}

impl SessionState {
    /// True for `Closed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// What to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Literal address, no resolution needed.
    Addr(IpAddr),
    /// Hostname to resolve first.
    Host(String),
}

impl From<IpAddr> for Target {
    fn from(ip: IpAddr) -> Self {
        Target::Addr(ip)
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        match s.parse::<IpAddr>() {
            Ok(ip) => Target::Addr(ip),
            Err(_) => Target::Host(s.to_string()),
        }
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Target::from(s.as_str())
    }
}

/// Tunables for a session.
///
/// Deserializable so it can live in an application's config file; every
/// field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Size of the buffer each transport read lands in.
    pub read_buffer_size: usize,
    /// Initial capacity of the reassembly buffer and the output queue.
    pub initial_buffer_capacity: usize,
    /// Per-candidate connect timeout in milliseconds (none = OS default).
    pub connect_timeout_ms: Option<u64>,
    /// Queued output bytes at which backpressure becomes active.
    pub output_high_watermark: usize,
    /// How long `wait_for_drain` waits, in milliseconds.
    pub backpressure_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            initial_buffer_capacity: DEFAULT_CAPACITY,
            connect_timeout_ms: None,
            output_high_watermark: DEFAULT_HIGH_WATERMARK,
            backpressure_timeout_ms: DEFAULT_BACKPRESSURE_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Per-candidate connect timeout.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Drain wait timeout.
    pub fn backpressure_timeout(&self) -> Duration {
        Duration::from_millis(self.backpressure_timeout_ms)
    }
}

/// Work queued for the driver task.
pub(crate) enum Command<C> {
    Close,
    Invoke(Box<dyn FnOnce(&mut C, &mut CodecEvents) + Send>),
}

/// Sending half of the command channel.
///
/// User handles hold a strong sender. The driver's own handle (the one passed
/// to listener callbacks) holds a weak one, so dropping the last user handle
/// closes the channel.
pub(crate) enum CommandSender<C> {
    Strong(mpsc::UnboundedSender<Command<C>>),
    Weak(mpsc::WeakUnboundedSender<Command<C>>),
}

impl<C> CommandSender<C> {
    fn send(&self, cmd: Command<C>) -> bool {
        match self {
            CommandSender::Strong(tx) => tx.send(cmd).is_ok(),
            CommandSender::Weak(tx) => match tx.upgrade() {
                Some(tx) => tx.send(cmd).is_ok(),
                None => false,
            },
        }
    }
}

impl<C> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        match self {
            CommandSender::Strong(tx) => CommandSender::Strong(tx.clone()),
            // A clone taken out of a callback is a real handle while one exists
            CommandSender::Weak(tx) => match tx.upgrade() {
                Some(tx) => CommandSender::Strong(tx),
                None => CommandSender::Weak(tx.clone()),
            },
        }
    }
}

/// State shared between the handle and the driver task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: SessionId,
    pub(crate) state: watch::Sender<SessionState>,
    pub(crate) peer: Mutex<Option<SocketAddr>>,
    pub(crate) pressure: OutputPressure,
}

/// Handle to a running session.
///
/// Cloning is cheap; all clones refer to the same session.
pub struct Session<C: Codec> {
    pub(crate) shared: Arc<Shared>,
    pub(crate) commands: CommandSender<C>,
}

impl<C: Codec> Session<C> {
    /// Start configuring a session around `codec`.
    pub fn builder<L>(codec: C, listener: Arc<L>) -> SessionBuilder<C>
    where
        L: SessionListener<C>,
    {
        SessionBuilder::new(codec, listener)
    }

    /// Identifier passed along with every listener callback.
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Address of the connected peer, once a transport is live.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer.lock().ok().and_then(|peer| *peer)
    }

    /// Ask the codec to start its close handshake.
    ///
    /// Before a transport exists this cancels the pending resolve/connect
    /// without notifying the listener.
    ///
    /// Returns `true` once the request is queued for the driver task. The
    /// codec may still refuse it there; watch [`state`](Self::state) for
    /// `Closing`. Returns `false` if the session is already closing or
    /// finished.
    ///
    /// Dropping the last handle has the same effect as calling `close`.
    pub fn close(&self) -> bool {
        let state = self.state();
        if state.is_terminal() || state == SessionState::Closing {
            return false;
        }
        self.commands.send(Command::Close)
    }

    /// Run `f` against the codec on the driver task.
    ///
    /// Bytes the closure emits go through the output queue like any other
    /// codec output; lifecycle events it reports are handled as usual.
    pub fn with_codec<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut C, &mut CodecEvents) + Send + 'static,
    {
        if self.state().is_terminal() {
            return Err(SessionError::SessionClosed);
        }
        if self.commands.send(Command::Invoke(Box::new(f))) {
            Ok(())
        } else {
            Err(SessionError::SessionClosed)
        }
    }

    /// Bytes waiting in the output queue.
    pub fn pending_output(&self) -> usize {
        self.shared.pressure.queued()
    }

    /// True when the output queue is at or above its high watermark.
    pub fn is_backpressure_active(&self) -> bool {
        self.shared.pressure.is_active()
    }

    /// Wait until the output queue drops below its high watermark.
    pub async fn wait_for_drain(&self) -> Result<()> {
        self.shared.pressure.wait_for_drain().await
    }

    /// Subscribe to state changes.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Handle that does not keep the command channel open.
    pub(crate) fn downgrade(&self) -> Self {
        let commands = match &self.commands {
            CommandSender::Strong(tx) => CommandSender::Weak(tx.downgrade()),
            CommandSender::Weak(tx) => CommandSender::Weak(tx.clone()),
        };
        Self {
            shared: self.shared.clone(),
            commands,
        }
    }

    /// Wait until the session is `Closed` or `Failed`.
    pub async fn wait_terminal(&self) -> SessionState {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }
}

impl<C: Codec> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            commands: self.commands.clone(),
        }
    }
}

impl<C: Codec> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("peer", &self.peer_addr())
            .finish()
    }
}

/// Builder for configuring and starting a [`Session`].
pub struct SessionBuilder<C: Codec, T = TcpTransport, R = SystemResolver> {
    codec: C,
    listener: Arc<dyn SessionListener<C>>,
    transport: T,
    resolver: R,
    config: SessionConfig,
}

impl<C: Codec> SessionBuilder<C> {
    /// Create a builder using TCP and the system resolver.
    pub fn new<L>(codec: C, listener: Arc<L>) -> Self
    where
        L: SessionListener<C>,
    {
        Self {
            codec,
            listener,
            transport: TcpTransport::new(),
            resolver: SystemResolver,
            config: SessionConfig::default(),
        }
    }
}

impl<C: Codec, T: Transport, R: Resolver> SessionBuilder<C, T, R> {
    /// Use a different transport.
    pub fn transport<T2: Transport>(self, transport: T2) -> SessionBuilder<C, T2, R> {
        SessionBuilder {
            codec: self.codec,
            listener: self.listener,
            transport,
            resolver: self.resolver,
            config: self.config,
        }
    }

    /// Use a different resolver.
    pub fn resolver<R2: Resolver>(self, resolver: R2) -> SessionBuilder<C, T, R2> {
        SessionBuilder {
            codec: self.codec,
            listener: self.listener,
            transport: self.transport,
            resolver,
            config: self.config,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the per-candidate connect timeout.
    ///
    /// Default: none
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the output high watermark in bytes.
    ///
    /// Default: 1 MiB
    pub fn output_high_watermark(mut self, bytes: usize) -> Self {
        self.config.output_high_watermark = bytes;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Current configuration.
    pub fn settings(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn the session and return its handle.
    ///
    /// Must be called from within a tokio runtime. The codec's `start` runs
    /// on the driver task before resolution begins.
    pub fn connect(self, target: impl Into<Target>, port: u16) -> Session<C> {
        let target = target.into();
        let initial = match target {
            Target::Addr(_) => SessionState::Connecting,
            Target::Host(_) => SessionState::Resolving,
        };

        let (state, _) = watch::channel(initial);
        let pressure = OutputPressure::with_timeout(
            self.config.output_high_watermark,
            self.config.backpressure_timeout(),
        );
        let shared = Arc::new(Shared {
            id: SessionId::next(),
            state,
            peer: Mutex::new(None),
            pressure,
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session {
            shared,
            commands: CommandSender::Strong(tx),
        };

        tracing::debug!("Session {} starting towards {:?}:{}", session.id(), target, port);

        let driver = Driver::new(
            session.downgrade(),
            self.codec,
            self.listener,
            self.config,
            rx,
        );
        tokio::spawn(driver.run(self.transport, self.resolver, target, port));

        session
    }
}
