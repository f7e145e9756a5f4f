//! Codec module - the contract between a session and its protocol decoder.
//!
//! A [`Codec`] is a black box with three entry points:
//!
//! - [`Codec::start`] - called once when the session is created, typically
//!   to emit a protocol greeting
//! - [`Codec::feed`] - consume as many complete frames as the slice holds and
//!   return the number of bytes consumed
//! - [`Codec::close`] - begin the codec's own close handshake
//!
//! Anything the codec wants to tell the session (bytes to send, lifecycle
//! changes) goes into the [`CodecEvents`] collector passed to each call.
//!
//! # Example
//!
//! ```
//! use sessionwire::codec::{Codec, CodecEvent, CodecEvents};
//!
//! /// Accepts two-byte frames and echoes them back.
//! struct Echo;
//!
//! impl Codec for Echo {
//!     fn feed(&mut self, data: &[u8], out: &mut CodecEvents) -> usize {
//!         let whole = data.len() - data.len() % 2;
//!         if whole > 0 {
//!             out.emit(&data[..whole]);
//!         }
//!         whole
//!     }
//!
//!     fn close(&mut self, out: &mut CodecEvents) -> bool {
//!         out.closed();
//!         true
//!     }
//! }
//!
//! let mut out = CodecEvents::new();
//! assert_eq!(Echo.feed(b"abc", &mut out), 2);
//! assert!(matches!(out.iter().next(), Some(CodecEvent::Outgoing(b)) if &b[..] == b"ab"));
//! ```

mod events;

pub use events::{CodecEvent, CodecEvents};

/// Incremental protocol decoder driven by a session.
///
/// Implementations must be able to accept a slice that ends in the middle of
/// a frame: they consume only the complete frames at the front and report the
/// count, and the session hands the remainder back on the next call together
/// with whatever arrived since.
pub trait Codec: Send + 'static {
    /// Called once when the session is created, before any transport exists.
    ///
    /// Bytes emitted here are queued and sent as soon as a connection is live.
    fn start(&mut self, out: &mut CodecEvents) {
        let _ = out;
    }

    /// Consume complete frames from the front of `data`.
    ///
    /// Returns the number of bytes consumed, never more than `data.len()`.
    fn feed(&mut self, data: &[u8], out: &mut CodecEvents) -> usize;

    /// Start the close handshake.
    ///
    /// Returns `false` if the codec refuses (e.g. it is already closing).
    /// Closure is only confirmed once the codec reports [`CodecEvents::closed`].
    fn close(&mut self, out: &mut CodecEvents) -> bool;
}
