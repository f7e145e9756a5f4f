//! Reassembly buffer for frames split across transport reads.
//!
//! Uses `bytes::BytesMut` so the retained suffix is trimmed from the head
//! without reallocating. In the common case a read holds only whole frames,
//! the chunk goes straight to the codec and nothing is copied at all.
//!
//! # Example
//!
//! ```
//! use sessionwire::codec::{Codec, CodecEvents};
//! use sessionwire::ReassemblyBuffer;
//!
//! /// Three-byte frames.
//! struct Triples(usize);
//!
//! impl Codec for Triples {
//!     fn feed(&mut self, data: &[u8], _out: &mut CodecEvents) -> usize {
//!         let whole = data.len() / 3;
//!         self.0 += whole;
//!         whole * 3
//!     }
//!     fn close(&mut self, _out: &mut CodecEvents) -> bool {
//!         true
//!     }
//! }
//!
//! let mut codec = Triples(0);
//! let mut out = CodecEvents::new();
//! let mut buffer = ReassemblyBuffer::new();
//!
//! buffer.on_bytes(&[1, 2], &mut codec, &mut out);
//! assert_eq!(buffer.as_slice(), &[1, 2]);
//!
//! buffer.on_bytes(&[3, 4], &mut codec, &mut out);
//! assert_eq!(buffer.as_slice(), &[4]);
//! assert_eq!(codec.0, 1);
//! ```

use bytes::{Buf, BytesMut};

use crate::codec::{Codec, CodecEvents};

/// Default initial capacity of the retained-bytes buffer.
pub const DEFAULT_CAPACITY: usize = 4 * 1024;

/// Holds the bytes the codec has not consumed yet.
///
/// Invariant: after every [`on_bytes`](Self::on_bytes) call the buffer holds
/// exactly the undecoded suffix of everything read so far.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    buffer: BytesMut,
}

impl ReassemblyBuffer {
    /// Create an empty buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty buffer with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Process one transport read.
    ///
    /// Returns how many bytes the codec consumed during this call (which may
    /// include bytes retained from earlier reads).
    pub fn on_bytes<C>(&mut self, chunk: &[u8], codec: &mut C, out: &mut CodecEvents) -> usize
    where
        C: Codec + ?Sized,
    {
        if self.buffer.is_empty() {
            let consumed = clamp(codec.feed(chunk, out), chunk.len());
            if consumed < chunk.len() {
                self.buffer.extend_from_slice(&chunk[consumed..]);
            }
            return consumed;
        }

        self.buffer.extend_from_slice(chunk);
        let consumed = clamp(codec.feed(&self.buffer, out), self.buffer.len());
        self.buffer.advance(consumed);
        consumed
    }

    /// The retained, not yet decoded bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the number of retained bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all retained bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp(consumed: usize, available: usize) -> usize {
    if consumed > available {
        tracing::warn!(
            "Codec reported {} bytes consumed out of {}, clamping",
            consumed,
            available
        );
        return available;
    }
    consumed
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-size frames, records every decoded frame.
    struct FixedCodec {
        size: usize,
        frames: Vec<Vec<u8>>,
    }

    impl FixedCodec {
        fn new(size: usize) -> Self {
            Self {
                size,
                frames: Vec::new(),
            }
        }
    }

    impl Codec for FixedCodec {
        fn feed(&mut self, data: &[u8], _out: &mut CodecEvents) -> usize {
            let whole = data.len() / self.size;
            for frame in data[..whole * self.size].chunks(self.size) {
                self.frames.push(frame.to_vec());
            }
            whole * self.size
        }

        fn close(&mut self, _out: &mut CodecEvents) -> bool {
            true
        }
    }

    /// Length-prefixed frames: one length byte followed by that many bytes.
    struct PrefixCodec {
        frames: Vec<Vec<u8>>,
    }

    impl Codec for PrefixCodec {
        fn feed(&mut self, data: &[u8], _out: &mut CodecEvents) -> usize {
            let mut consumed = 0;
            while let Some(&len) = data.get(consumed) {
                let end = consumed + 1 + len as usize;
                if end > data.len() {
                    break;
                }
                self.frames.push(data[consumed + 1..end].to_vec());
                consumed = end;
            }
            consumed
        }

        fn close(&mut self, _out: &mut CodecEvents) -> bool {
            true
        }
    }

    /// Reports more than it was given.
    struct GreedyCodec;

    impl Codec for GreedyCodec {
        fn feed(&mut self, data: &[u8], _out: &mut CodecEvents) -> usize {
            data.len() + 10
        }

        fn close(&mut self, _out: &mut CodecEvents) -> bool {
            true
        }
    }

    #[test]
    fn test_whole_frames_retain_nothing() {
        let mut codec = FixedCodec::new(2);
        let mut out = CodecEvents::new();
        let mut buffer = ReassemblyBuffer::new();

        let consumed = buffer.on_bytes(&[1, 2, 3, 4], &mut codec, &mut out);

        assert_eq!(consumed, 4);
        assert!(buffer.is_empty());
        assert_eq!(codec.frames, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_split_frame_across_two_reads() {
        let mut codec = FixedCodec::new(3);
        let mut out = CodecEvents::new();
        let mut buffer = ReassemblyBuffer::new();

        buffer.on_bytes(b"\x01\x02", &mut codec, &mut out);
        assert_eq!(buffer.as_slice(), b"\x01\x02");
        assert!(codec.frames.is_empty());

        buffer.on_bytes(b"\x03\x04", &mut codec, &mut out);
        assert_eq!(buffer.as_slice(), b"\x04");
        assert_eq!(codec.frames, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_still_incomplete_keeps_everything() {
        let mut codec = FixedCodec::new(8);
        let mut out = CodecEvents::new();
        let mut buffer = ReassemblyBuffer::new();

        buffer.on_bytes(&[1, 2, 3], &mut codec, &mut out);
        let consumed = buffer.on_bytes(&[4, 5], &mut codec, &mut out);

        assert_eq!(consumed, 0);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_multiple_frames_leave_partial_remainder() {
        let mut codec = PrefixCodec { frames: Vec::new() };
        let mut out = CodecEvents::new();
        let mut buffer = ReassemblyBuffer::new();

        buffer.on_bytes(&[2, b'a'], &mut codec, &mut out);
        buffer.on_bytes(&[b'b', 1, b'c', 3, b'd'], &mut codec, &mut out);

        assert_eq!(codec.frames, vec![b"ab".to_vec(), b"c".to_vec()]);
        assert_eq!(buffer.as_slice(), &[3, b'd']);
    }

    #[test]
    fn test_bytes_never_fed_twice_from_empty_path() {
        let mut codec = FixedCodec::new(4);
        let mut out = CodecEvents::new();
        let mut buffer = ReassemblyBuffer::new();

        // Whole frame plus a partial one straight from the empty path
        buffer.on_bytes(&[1, 2, 3, 4, 5], &mut codec, &mut out);
        assert_eq!(buffer.as_slice(), &[5]);
        assert_eq!(codec.frames.len(), 1);
    }

    #[test]
    fn test_byte_at_a_time() {
        let stream: Vec<u8> = vec![3, b'x', b'y', b'z', 0, 1, b'q'];
        let mut codec = PrefixCodec { frames: Vec::new() };
        let mut out = CodecEvents::new();
        let mut buffer = ReassemblyBuffer::new();

        for byte in &stream {
            buffer.on_bytes(&[*byte], &mut codec, &mut out);
        }

        assert_eq!(
            codec.frames,
            vec![b"xyz".to_vec(), Vec::new(), b"q".to_vec()]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overreporting_codec_is_clamped() {
        let mut out = CodecEvents::new();
        let mut buffer = ReassemblyBuffer::new();

        assert_eq!(buffer.on_bytes(&[1, 2, 3], &mut GreedyCodec, &mut out), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut codec = FixedCodec::new(10);
        let mut out = CodecEvents::new();
        let mut buffer = ReassemblyBuffer::with_capacity(16);

        buffer.on_bytes(&[1, 2, 3], &mut codec, &mut out);
        assert_eq!(buffer.len(), 3);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    mod chunking {
        use super::*;
        use proptest::prelude::*;

        fn encode(frames: &[Vec<u8>]) -> Vec<u8> {
            let mut stream = Vec::new();
            for frame in frames {
                stream.push(frame.len() as u8);
                stream.extend_from_slice(frame);
            }
            stream
        }

        proptest! {
            #[test]
            fn any_chunking_decodes_same_frames(
                frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..20), 0..16),
                cuts in prop::collection::vec(1usize..8, 0..64),
            ) {
                let stream = encode(&frames);

                let mut codec = PrefixCodec { frames: Vec::new() };
                let mut out = CodecEvents::new();
                let mut buffer = ReassemblyBuffer::new();

                let mut offset = 0;
                let mut cuts = cuts.into_iter();
                while offset < stream.len() {
                    let step = cuts.next().unwrap_or(1);
                    let end = (offset + step).min(stream.len());
                    buffer.on_bytes(&stream[offset..end], &mut codec, &mut out);
                    offset = end;
                }

                prop_assert_eq!(&codec.frames, &frames);
                prop_assert!(buffer.is_empty());
            }

            #[test]
            fn codec_sees_every_byte_once_when_frames_complete(
                frame_count in 0usize..20,
                cuts in prop::collection::vec(1usize..5, 0..64),
            ) {
                let stream: Vec<u8> = (0..frame_count * 4).map(|i| i as u8).collect();
                let mut codec = FixedCodec::new(4);
                let mut out = CodecEvents::new();
                let mut buffer = ReassemblyBuffer::new();

                let mut offset = 0;
                let mut cuts = cuts.into_iter();
                let mut consumed = 0;
                while offset < stream.len() {
                    let end = (offset + cuts.next().unwrap_or(1)).min(stream.len());
                    consumed += buffer.on_bytes(&stream[offset..end], &mut codec, &mut out);
                    offset = end;
                }

                prop_assert_eq!(consumed, stream.len());
                prop_assert_eq!(codec.frames.len(), frame_count);
                prop_assert_eq!(codec.frames.concat(), stream);
            }
        }
    }
}
