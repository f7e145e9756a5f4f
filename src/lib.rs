//! # sessionwire
//!
//! Bridges a streaming byte transport (TCP) to a pluggable protocol
//! [`Codec`](codec::Codec).
//!
//! A session resolves a hostname, tries each candidate address in turn,
//! feeds arriving bytes through a reassembly buffer into the codec, writes
//! whatever the codec emits through a backpressure-aware output queue, and
//! reports lifecycle changes to a [`SessionListener`].
//!
//! ## Architecture
//!
//! - **Codec** (sans-io): consumes complete frames, emits bytes and events
//! - **Driver** (one tokio task per session): owns the codec, the buffers
//!   and the connection; handles readiness and commands one at a time
//! - **Handle** ([`Session`]): cloneable, used to close the session, reach
//!   the codec and observe state
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sessionwire::{Session, SessionListener};
//! use sessionwire::protocol::FrameCodec;
//!
//! struct Log;
//!
//! impl SessionListener<FrameCodec> for Log {
//!     fn on_connected(&self, session: &Session<FrameCodec>) {
//!         println!("{} connected", session.id());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::builder(FrameCodec::new(), Arc::new(Log))
//!         .connect("broker.local", 5672);
//!
//!     session
//!         .with_codec(|codec, out| {
//!             let _ = codec.send(1, 0, b"hello", out);
//!         })
//!         .unwrap();
//!
//!     session.close();
//!     session.wait_terminal().await;
//! }
//! ```

pub mod backpressure;
pub mod codec;
pub mod connector;
pub mod error;
pub mod listener;
pub mod output;
pub mod protocol;
pub mod reassembly;
pub mod resolver;
pub mod session;
pub mod transport;

mod driver;

pub use backpressure::OutputPressure;
pub use connector::{AddressFallbackConnector, CandidateList, ConnectState};
pub use error::{Result, SessionError};
pub use listener::{NoopListener, SessionListener};
pub use output::OutputQueue;
pub use reassembly::ReassemblyBuffer;
pub use resolver::{Resolver, StaticResolver, SystemResolver};
pub use session::{Session, SessionBuilder, SessionConfig, SessionId, SessionState, Target};
pub use transport::{Connection, TcpTransport, Transport};
