//! Per-session driver task.
//!
//! Everything that touches the codec, the buffers and the connection runs
//! here, one event at a time:
//!
//! ```text
//!            ┌──────────── commands (close, with_codec) ────────────┐
//!            ▼                                                       │
//! resolve ─► connect ─► select! { readable ─► ReassemblyBuffer ─► codec
//!                                 writable ─► OutputQueue::flush    │
//!                                 command  ─► codec }               │
//!                                      ▲                             │
//!                                      └──── codec events ◄──────────┘
//! ```
//!
//! The writable branch is only armed while the output queue holds bytes, and
//! only exists once a connection is live.
//!
//! The driver's own [`Session`] holds a weak command sender, so the channel
//! closes with the last user handle. That is treated as a `close()`.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::codec::{Codec, CodecEvent, CodecEvents};
use crate::connector::{AddressFallbackConnector, CandidateList};
use crate::error::SessionError;
use crate::listener::SessionListener;
use crate::output::OutputQueue;
use crate::reassembly::ReassemblyBuffer;
use crate::resolver::Resolver;
use crate::session::{Command, Session, SessionConfig, SessionState, Target};
use crate::transport::{Connection, Transport};

/// What the driver should do after handling one event.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Codec confirmed closure.
    Closed,
    /// Unrecoverable; carries the message for the listener.
    Failed(String),
    /// Owner cancelled before a transport existed.
    Cancelled,
}

pub(crate) struct Driver<C: Codec> {
    session: Session<C>,
    codec: C,
    listener: Arc<dyn SessionListener<C>>,
    config: SessionConfig,
    commands: mpsc::UnboundedReceiver<Command<C>>,
    /// False once every user handle is gone.
    commands_open: bool,
    reassembly: ReassemblyBuffer,
    output: OutputQueue,
}

impl<C: Codec> Driver<C> {
    pub(crate) fn new(
        session: Session<C>,
        codec: C,
        listener: Arc<dyn SessionListener<C>>,
        config: SessionConfig,
        commands: mpsc::UnboundedReceiver<Command<C>>,
    ) -> Self {
        let capacity = config.initial_buffer_capacity;
        let pressure = session.shared.pressure.clone();
        Self {
            session,
            codec,
            listener,
            config,
            commands,
            commands_open: true,
            reassembly: ReassemblyBuffer::with_capacity(capacity),
            output: OutputQueue::with_pressure(capacity, pressure),
        }
    }

    /// Drive the session from creation to its terminal state.
    pub(crate) async fn run<T, R>(mut self, transport: T, resolver: R, target: Target, port: u16)
    where
        T: Transport,
        R: Resolver,
    {
        let mut events = CodecEvents::new();
        self.codec.start(&mut events);
        let flow = self.apply(events);
        if flow != Flow::Continue {
            self.finish::<T::Conn>(flow, None);
            return;
        }

        let ips = match target {
            Target::Addr(ip) => vec![ip],
            Target::Host(host) => match self.resolve(&resolver, &host).await {
                Ok(ips) => ips,
                Err(flow) => {
                    self.finish::<T::Conn>(flow, None);
                    return;
                }
            },
        };

        self.publish(SessionState::Connecting);
        let conn = match self.establish(&transport, CandidateList::new(ips, port)).await {
            Ok(conn) => conn,
            Err(flow) => {
                self.finish::<T::Conn>(flow, None);
                return;
            }
        };

        let flow = self.serve(&conn).await;
        self.finish(flow, Some(conn));
    }

    /// Resolve `host`, handling commands while the lookup is in flight.
    async fn resolve<R: Resolver>(
        &mut self,
        resolver: &R,
        host: &str,
    ) -> Result<Vec<IpAddr>, Flow> {
        self.publish(SessionState::Resolving);

        let lookup = resolver.resolve(host);
        tokio::pin!(lookup);

        let result = loop {
            tokio::select! {
                result = &mut lookup => break result,
                cmd = self.commands.recv() => {
                    let flow = self.on_pending_command(cmd);
                    if flow != Flow::Continue {
                        return Err(flow);
                    }
                }
            }
        };

        match result {
            Ok(ips) if ips.is_empty() => Err(Flow::Failed(
                SessionError::NoAddresses(host.to_string()).to_string(),
            )),
            Ok(ips) => {
                tracing::debug!("Resolved {} to {:?}", host, ips);
                Ok(ips)
            }
            Err(e) => Err(Flow::Failed(
                SessionError::Resolve {
                    host: host.to_string(),
                    reason: e.to_string(),
                }
                .to_string(),
            )),
        }
    }

    /// Walk the candidates, handling commands while attempts are in flight.
    async fn establish<T: Transport>(
        &mut self,
        transport: &T,
        candidates: CandidateList,
    ) -> Result<T::Conn, Flow> {
        let mut connector =
            AddressFallbackConnector::new(transport).connect_timeout(self.config.connect_timeout());
        let attempt = connector.connect(candidates);
        tokio::pin!(attempt);

        let result = loop {
            tokio::select! {
                result = &mut attempt => break result,
                cmd = self.commands.recv() => {
                    let flow = self.on_pending_command(cmd);
                    if flow != Flow::Continue {
                        // Dropping `attempt` abandons the in-flight connect
                        return Err(flow);
                    }
                }
            }
        };

        match result {
            Ok(connected) => {
                if let Ok(mut peer) = self.session.shared.peer.lock() {
                    *peer = Some(connected.addr);
                }
                self.publish(SessionState::Established);
                Ok(connected.conn)
            }
            Err(e) => Err(Flow::Failed(e.to_string())),
        }
    }

    /// Main loop while a connection is live.
    async fn serve<K: Connection>(&mut self, conn: &K) -> Flow {
        let mut read_buf = vec![0u8; self.config.read_buffer_size.max(1)];

        loop {
            let flow = tokio::select! {
                ready = conn.readable() => match ready {
                    Ok(()) => self.on_readable(conn, &mut read_buf),
                    Err(e) => lost(e),
                },
                ready = conn.writable(), if !self.output.is_empty() => match ready {
                    Ok(()) => self.on_writable(conn),
                    Err(e) => lost(e),
                },
                cmd = self.commands.recv(), if self.commands_open => self.on_command(cmd),
            };

            if flow != Flow::Continue {
                return flow;
            }
        }
    }

    fn on_readable<K: Connection>(&mut self, conn: &K, buf: &mut [u8]) -> Flow {
        match conn.try_read(buf) {
            Ok(0) => Flow::Failed(SessionError::ConnectionLost.to_string()),
            Ok(n) => {
                let mut events = CodecEvents::new();
                self.reassembly
                    .on_bytes(&buf[..n], &mut self.codec, &mut events);
                self.apply(events)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Flow::Continue,
            Err(e) => lost(e),
        }
    }

    fn on_writable<K: Connection>(&mut self, conn: &K) -> Flow {
        match self.output.flush(|buf| conn.try_write(buf)) {
            Ok(_) => Flow::Continue,
            Err(e) => lost(e),
        }
    }

    /// Command while a connection is live.
    fn on_command(&mut self, cmd: Option<Command<C>>) -> Flow {
        let mut events = CodecEvents::new();
        if cmd.is_none() {
            tracing::debug!("Session {}: all handles dropped, closing", self.session.id());
            self.commands_open = false;
        }
        match cmd {
            Some(Command::Close) | None => {
                if self.codec.close(&mut events) {
                    self.publish(SessionState::Closing);
                } else {
                    tracing::debug!("Session {}: codec refused close", self.session.id());
                }
            }
            Some(Command::Invoke(f)) => f(&mut self.codec, &mut events),
        }
        self.apply(events)
    }

    /// Command before a connection exists. Close cancels the attempt.
    fn on_pending_command(&mut self, cmd: Option<Command<C>>) -> Flow {
        match cmd {
            Some(Command::Close) | None => {
                tracing::debug!("Session {}: cancelled before connect", self.session.id());
                Flow::Cancelled
            }
            Some(Command::Invoke(f)) => {
                let mut events = CodecEvents::new();
                f(&mut self.codec, &mut events);
                self.apply(events)
            }
        }
    }

    /// Route codec events: bytes to the output queue, lifecycle to the listener.
    fn apply(&mut self, mut events: CodecEvents) -> Flow {
        for event in events.drain() {
            match event {
                CodecEvent::Outgoing(bytes) => self.output.enqueue(&bytes),
                CodecEvent::Connected => {
                    if self.session.state() == SessionState::Established {
                        self.publish(SessionState::Ready);
                    }
                    self.listener.on_connected(&self.session);
                }
                CodecEvent::Error(message) => return Flow::Failed(message),
                CodecEvent::Closed => return Flow::Closed,
            }
        }
        Flow::Continue
    }

    /// Release everything, then tell the listener (at most once).
    fn finish<K: Connection>(&mut self, flow: Flow, conn: Option<K>) {
        match flow {
            Flow::Continue => {}
            Flow::Closed => {
                if let Some(conn) = &conn {
                    // Last chance for a close reply queued with the Closed event
                    match self.output.flush(|buf| conn.try_write(buf)) {
                        Ok(false) => {}
                        Ok(true) => tracing::debug!(
                            "Session {}: dropping {} unsent bytes on close",
                            self.session.id(),
                            self.output.len()
                        ),
                        Err(e) => tracing::debug!("Final flush failed: {}", e),
                    }
                }
                self.release(conn);
                self.publish(SessionState::Closed);
                self.listener.on_closed(&self.session);
            }
            Flow::Failed(message) => {
                tracing::warn!("Session {} failed: {}", self.session.id(), message);
                self.release(conn);
                self.publish(SessionState::Failed);
                self.listener.on_error(&self.session, &message);
            }
            Flow::Cancelled => {
                self.release(conn);
                self.publish(SessionState::Closed);
            }
        }
    }

    fn release<K: Connection>(&mut self, conn: Option<K>) {
        drop(conn);
        self.reassembly.clear();
        self.output.clear();
    }

    fn publish(&self, state: SessionState) {
        let previous = self.session.shared.state.send_replace(state);
        if previous != state {
            tracing::debug!(
                "Session {}: {:?} -> {:?}",
                self.session.id(),
                previous,
                state
            );
        }
    }
}

fn lost(e: io::Error) -> Flow {
    tracing::debug!("Transport error: {}", e);
    Flow::Failed(SessionError::Io(e).to_string())
}
