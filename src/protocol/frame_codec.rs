//! Length-prefixed frame codec with an OPEN/CLOSE handshake.
//!
//! Session lifecycle on the wire:
//!
//! ```text
//! client                         peer
//!   │── OPEN "SWIRE1" ───────────►│
//!   │◄────────────── OPEN "SWIRE1"│   both sides: connected
//!   │── data frames ─────────────►│
//!   │◄───────────── data frames ──│
//!   │── CLOSE ───────────────────►│
//!   │◄─────────────── CLOSE+REPLY │   closer: closed
//! ```
//!
//! Either side may start the close. The side receiving an unsolicited CLOSE
//! answers with CLOSE+REPLY and considers the session closed.

use bytes::Bytes;
use tokio::sync::mpsc;

use super::frame::{build_frame, Frame};
use super::wire_format::{
    flags, Header, CLOSE_METHOD_ID, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, OPEN_METHOD_ID,
    PROTOCOL_MAGIC,
};
use crate::codec::{Codec, CodecEvents};
use crate::error::{Result, SessionError};

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// OPEN sent (or about to be), waiting for the peer's.
    Opening,
    /// Both greetings exchanged.
    Open,
    /// We sent CLOSE and wait for the reply.
    Closing,
    Closed,
    /// A protocol error was reported; nothing more is read.
    Failed,
}

/// Codec speaking the 11-byte-header frame protocol.
///
/// Data frames either go to the channel returned by [`FrameCodec::channel`]
/// or are kept until [`FrameCodec::take_frames`] collects them.
///
/// # Example
///
/// ```
/// use sessionwire::codec::{Codec, CodecEvents};
/// use sessionwire::protocol::FrameCodec;
///
/// let mut codec = FrameCodec::new();
/// let mut out = CodecEvents::new();
/// codec.start(&mut out);
/// codec.send(1, 0, b"ping", &mut out).unwrap();
/// assert_eq!(out.outgoing_len(), (11 + 6) + (11 + 4));
/// ```
#[derive(Debug)]
pub struct FrameCodec {
    phase: Phase,
    max_payload_size: u32,
    inbox: Option<mpsc::UnboundedSender<Frame>>,
    received: Vec<Frame>,
}

impl FrameCodec {
    /// Create a codec that stores incoming frames internally.
    pub fn new() -> Self {
        Self {
            phase: Phase::Opening,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            inbox: None,
            received: Vec::new(),
        }
    }

    /// Create a codec that forwards incoming data frames to a channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut codec = Self::new();
        codec.inbox = Some(tx);
        (codec, rx)
    }

    /// Limit the payload size accepted in either direction.
    pub fn with_max_payload(mut self, max_payload_size: u32) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Check if both greetings were exchanged and no close has started.
    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    /// Queue a data frame.
    ///
    /// Allowed while opening (the frame follows our OPEN on the wire) and
    /// while open.
    pub fn send(
        &mut self,
        method_id: u16,
        request_id: u32,
        payload: &[u8],
        out: &mut CodecEvents,
    ) -> Result<()> {
        self.send_with_flags(method_id, 0, request_id, payload, out)
    }

    /// Queue a reply to a frame received earlier.
    pub fn reply(&mut self, to: &Frame, payload: &[u8], out: &mut CodecEvents) -> Result<()> {
        self.send_with_flags(to.method_id(), flags::REPLY, to.request_id(), payload, out)
    }

    fn send_with_flags(
        &mut self,
        method_id: u16,
        flags: u8,
        request_id: u32,
        payload: &[u8],
        out: &mut CodecEvents,
    ) -> Result<()> {
        if !matches!(self.phase, Phase::Opening | Phase::Open) {
            return Err(SessionError::Protocol(format!(
                "Cannot send in phase {:?}",
                self.phase
            )));
        }
        if method_id == OPEN_METHOD_ID || method_id == CLOSE_METHOD_ID {
            return Err(SessionError::Protocol(format!(
                "Method ID {:#06x} is reserved for the handshake",
                method_id
            )));
        }
        let length = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Header::new(method_id, flags, request_id, length).validate(self.max_payload_size)?;

        out.emit_bytes(build_frame(method_id, flags, request_id, payload));
        Ok(())
    }

    /// Take the data frames received so far (empty when a channel is used).
    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.received)
    }

    fn deliver(&mut self, frame: Frame) {
        match &self.inbox {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    tracing::trace!("Frame receiver dropped, discarding frame");
                }
            }
            None => self.received.push(frame),
        }
    }

    fn fail(&mut self, message: impl Into<String>, out: &mut CodecEvents) {
        self.phase = Phase::Failed;
        out.error(message);
    }

    /// Handle one complete frame.
    fn dispatch(&mut self, header: Header, payload: Bytes, out: &mut CodecEvents) {
        if header.is_open() {
            if self.phase != Phase::Opening {
                return self.fail("Unexpected OPEN", out);
            }
            if &payload[..] != PROTOCOL_MAGIC {
                return self.fail("Unsupported protocol greeting", out);
            }
            self.phase = Phase::Open;
            out.connected();
        } else if header.is_close() {
            if header.is_reply() {
                if self.phase != Phase::Closing {
                    return self.fail("Unexpected CLOSE reply", out);
                }
            } else {
                out.emit_bytes(build_frame(CLOSE_METHOD_ID, flags::REPLY, header.request_id, b""));
            }
            self.phase = Phase::Closed;
            out.closed();
        } else {
            if self.phase == Phase::Opening {
                return self.fail("Data frame before OPEN", out);
            }
            self.deliver(Frame::new(header, payload));
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for FrameCodec {
    fn start(&mut self, out: &mut CodecEvents) {
        let frame = build_frame(OPEN_METHOD_ID, 0, 0, PROTOCOL_MAGIC);
        out.emit_bytes(frame);
    }

    fn feed(&mut self, data: &[u8], out: &mut CodecEvents) -> usize {
        let mut consumed = 0;

        while matches!(self.phase, Phase::Opening | Phase::Open | Phase::Closing) {
            let rest = &data[consumed..];
            let Some(header) = Header::decode(rest) else {
                break;
            };
            if let Err(e) = header.validate(self.max_payload_size) {
                let message = match e {
                    SessionError::Protocol(message) => message,
                    other => other.to_string(),
                };
                self.fail(message, out);
                break;
            }
            let frame_len = header.frame_len();
            if rest.len() < frame_len {
                break;
            }

            let payload = Bytes::copy_from_slice(&rest[HEADER_SIZE..frame_len]);
            consumed += frame_len;
            self.dispatch(header, payload, out);
        }

        consumed
    }

    fn close(&mut self, out: &mut CodecEvents) -> bool {
        match self.phase {
            Phase::Opening | Phase::Open => {
                out.emit_bytes(build_frame(CLOSE_METHOD_ID, 0, 0, b""));
                self.phase = Phase::Closing;
                true
            }
            Phase::Closing | Phase::Closed | Phase::Failed => false,
        }
    }
}
