//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use sessionwire::protocol::{Frame, Header, flags};
//! use bytes::Bytes;
//!
//! let header = Header::new(1, flags::REPLY, 42, 5);
//! let payload = Bytes::from_static(b"hello");
//! let frame = Frame::new(header, payload);
//!
//! assert_eq!(frame.method_id(), 1);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{flags, Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn method_id(&self) -> u16 {
        self.header.method_id
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    /// Check if this frame answers an earlier one.
    #[inline]
    pub fn is_reply(&self) -> bool {
        flags::has_flag(self.header.flags, flags::REPLY)
    }
}

/// Build a complete frame as a single byte buffer.
///
/// The header's `payload_length` is taken from `payload`.
///
/// # Example
///
/// ```
/// use sessionwire::protocol::build_frame;
///
/// let bytes = build_frame(1, 0, 42, b"hello");
/// assert_eq!(bytes.len(), 11 + 5);
/// ```
pub fn build_frame(method_id: u16, flags: u8, request_id: u32, payload: &[u8]) -> Bytes {
    let header = Header::new(method_id, flags, request_id, payload.len() as u32);
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(0x0102, flags::REPLY, 7, b"xyz");

        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header, Header::new(0x0102, flags::REPLY, 7, 3));
        assert_eq!(&bytes[HEADER_SIZE..], b"xyz");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let bytes = build_frame(9, 0, 0, b"");
        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(Header::new(3, flags::REPLY, 11, 2), Bytes::from_static(b"ok"));
        assert_eq!(frame.method_id(), 3);
        assert_eq!(frame.request_id(), 11);
        assert_eq!(frame.flags(), flags::REPLY);
        assert!(frame.is_reply());
        assert_eq!(frame.payload(), b"ok");
    }
}
