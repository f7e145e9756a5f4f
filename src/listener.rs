//! Session lifecycle callbacks.
//!
//! Implement [`SessionListener`] and override only the events you care about.
//! One listener can serve many sessions; the `session` argument says which
//! one raised the event.
//!
//! # Example
//!
//! ```
//! use sessionwire::{Session, SessionListener};
//! use sessionwire::protocol::FrameCodec;
//!
//! struct Printer;
//!
//! impl SessionListener<FrameCodec> for Printer {
//!     fn on_connected(&self, session: &Session<FrameCodec>) {
//!         println!("session {} ready", session.id());
//!     }
//!
//!     fn on_error(&self, session: &Session<FrameCodec>, message: &str) {
//!         eprintln!("session {} failed: {}", session.id(), message);
//!     }
//! }
//! ```

use crate::codec::Codec;
use crate::session::Session;

/// Receives lifecycle events from sessions.
///
/// Callbacks run on the session's driver task and must not block. Calls back
/// into the session (`close`, `with_codec`) are queued and handled after the
/// callback returns.
pub trait SessionListener<C: Codec>: Send + Sync + 'static {
    /// The session failed: unresolvable host, no reachable address, protocol
    /// error or lost connection. The session is unusable afterwards.
    fn on_error(&self, session: &Session<C>, message: &str) {
        let _ = (session, message);
    }

    /// The codec completed its handshake.
    fn on_connected(&self, session: &Session<C>) {
        let _ = session;
    }

    /// The codec completed its close handshake and the transport is released.
    fn on_closed(&self, session: &Session<C>) {
        let _ = session;
    }
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl<C: Codec> SessionListener<C> for NoopListener {}
