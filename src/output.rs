//! Output queue for bytes the codec wants to send.
//!
//! The codec may emit at any time, including before a transport exists and
//! while the socket buffer is full. Everything it emits is appended here and
//! drained on writable notifications:
//!
//! ```text
//! codec emit ─► OutputQueue::enqueue ─► (writable) ─► flush ─► try_write
//!                                          ▲                      │
//!                                          └──── partial write ───┘
//! ```
//!
//! Writes are always non-blocking; a partial write just leaves the tail queued.

use std::io;

use bytes::{Buf, BytesMut};

use crate::backpressure::OutputPressure;
use crate::reassembly::DEFAULT_CAPACITY;

/// Bytes waiting to be written to the transport.
#[derive(Debug)]
pub struct OutputQueue {
    buffer: BytesMut,
    pressure: OutputPressure,
}

impl OutputQueue {
    /// Create an empty queue with its own pressure counter.
    pub fn new() -> Self {
        Self::with_pressure(DEFAULT_CAPACITY, OutputPressure::default())
    }

    /// Create an empty queue reporting into a shared pressure counter.
    pub fn with_pressure(capacity: usize, pressure: OutputPressure) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            pressure,
        }
    }

    /// Append bytes to the tail.
    pub fn enqueue(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(data);
        self.pressure.add(data.len());
    }

    /// Try to send everything queued with a single non-blocking `send` call.
    ///
    /// `send` gets the whole queued contents and returns how many bytes the
    /// transport accepted. Returns `Ok(true)` while bytes remain, meaning the
    /// caller should keep waiting for writable notifications, and `Ok(false)`
    /// once the queue is empty. An empty queue never calls `send`.
    ///
    /// `ErrorKind::WouldBlock` counts as zero bytes accepted. Any other error
    /// is returned and leaves the queue untouched.
    pub fn flush<F>(&mut self, send: F) -> io::Result<bool>
    where
        F: FnOnce(&[u8]) -> io::Result<usize>,
    {
        if self.buffer.is_empty() {
            return Ok(false);
        }

        let queued = self.buffer.len();
        let written = match send(&self.buffer) {
            Ok(n) => n.min(queued),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => return Err(e),
        };

        if written == queued {
            self.buffer.clear();
            self.pressure.remove(queued);
            return Ok(false);
        }

        tracing::trace!("Partial write: {} of {} bytes", written, queued);
        self.buffer.advance(written);
        self.pressure.remove(written);
        Ok(true)
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The queued bytes, oldest first.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pressure.reset();
    }

    /// Shared pressure counter fed by this queue.
    pub fn pressure(&self) -> &OutputPressure {
        &self.pressure
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}
