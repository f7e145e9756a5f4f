//! Protocol module - wire format, frame types and the frame codec.
//!
//! This module implements a small binary protocol on top of sessions:
//! - 11-byte header encoding/decoding
//! - Frame struct with typed accessors
//! - [`FrameCodec`], a [`Codec`](crate::codec::Codec) with an OPEN/CLOSE handshake

mod frame;
mod frame_codec;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_codec::{FrameCodec, Phase};
pub use wire_format::{
    flags, Header, CLOSE_METHOD_ID, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, OPEN_METHOD_ID,
    PROTOCOL_MAGIC, RESERVED_METHOD_ID,
};
