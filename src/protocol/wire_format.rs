//! Wire format encoding and decoding.
//!
//! Every frame starts with an 11-byte header:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Method ID│ Flags │ Req ID   │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. Two method IDs are reserved for
//! the session handshake: [`OPEN_METHOD_ID`] and [`CLOSE_METHOD_ID`].

use crate::error::{Result, SessionError};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Reserved method ID (never valid on the wire).
pub const RESERVED_METHOD_ID: u16 = 0;

/// Handshake greeting, sent by both ends when a session starts.
pub const OPEN_METHOD_ID: u16 = 0xFFFE;

/// Close request, and with [`flags::REPLY`] its confirmation.
pub const CLOSE_METHOD_ID: u16 = 0xFFFF;

/// Payload of the OPEN frame.
pub const PROTOCOL_MAGIC: &[u8] = b"SWIRE1";

/// Flag constants for the protocol.
pub mod flags {
    /// Frame answers an earlier frame.
    pub const REPLY: u8 = 0b0000_0001;
    /// Free for applications.
    pub const USER_MASK: u8 = 0b0000_1110;
    /// Reserved bits mask (bits 4-7).
    pub const RESERVED_MASK: u8 = 0b1111_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Method identifier (1-65533 for data, see reserved IDs above).
    pub method_id: u16,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Request identifier chosen by the sender.
    pub request_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(method_id: u16, flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            method_id,
            flags,
            request_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use sessionwire::protocol::{Header, flags};
    ///
    /// let header = Header::new(1, flags::REPLY, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 11);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.method_id.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.request_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use sessionwire::protocol::Header;
    ///
    /// let bytes = [0, 1, 0x01, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.method_id, 1);
    /// assert_eq!(header.request_id, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            method_id: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            request_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Method ID is not 0 (reserved)
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.method_id == RESERVED_METHOD_ID {
            return Err(SessionError::Protocol("Method ID 0 is reserved".to_string()));
        }

        if self.payload_length > max_payload_size {
            return Err(SessionError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(SessionError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Total frame size (header + payload).
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_length as usize
    }

    /// Check if this is the OPEN greeting.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.method_id == OPEN_METHOD_ID
    }

    /// Check if this is a CLOSE request or reply.
    #[inline]
    pub fn is_close(&self) -> bool {
        self.method_id == CLOSE_METHOD_ID
    }

    /// Check if this is a reply.
    #[inline]
    pub fn is_reply(&self) -> bool {
        flags::has_flag(self.flags, flags::REPLY)
    }
}
