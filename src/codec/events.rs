//! Event collector handed to codec calls.

use bytes::Bytes;

/// Something a codec reported during a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecEvent {
    /// Bytes the codec wants written to the transport.
    Outgoing(Bytes),
    /// Protocol-level handshake completed.
    Connected,
    /// Malformed or out-of-sequence data; the session is unusable afterwards.
    Error(String),
    /// Close handshake completed.
    Closed,
}

/// Ordered collection of [`CodecEvent`]s produced by one codec call.
#[derive(Debug, Default)]
pub struct CodecEvents {
    events: Vec<CodecEvent>,
}

impl CodecEvents {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for sending (copies the slice).
    pub fn emit(&mut self, data: &[u8]) {
        if !data.is_empty() {
            self.events
                .push(CodecEvent::Outgoing(Bytes::copy_from_slice(data)));
        }
    }

    /// Queue already-owned bytes for sending.
    pub fn emit_bytes(&mut self, data: Bytes) {
        if !data.is_empty() {
            self.events.push(CodecEvent::Outgoing(data));
        }
    }

    /// Report that the protocol handshake completed.
    pub fn connected(&mut self) {
        self.events.push(CodecEvent::Connected);
    }

    /// Report a protocol error.
    pub fn error(&mut self, message: impl Into<String>) {
        self.events.push(CodecEvent::Error(message.into()));
    }

    /// Report that the close handshake completed.
    pub fn closed(&mut self) {
        self.events.push(CodecEvent::Closed);
    }

    /// Number of collected events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the collected events in order.
    pub fn iter(&self) -> std::slice::Iter<'_, CodecEvent> {
        self.events.iter()
    }

    /// Take all events, leaving the collector empty for reuse.
    pub fn drain(&mut self) -> std::vec::Drain<'_, CodecEvent> {
        self.events.drain(..)
    }

    /// Total bytes across all `Outgoing` events.
    pub fn outgoing_len(&self) -> usize {
        self.events
            .iter()
            .map(|e| match e {
                CodecEvent::Outgoing(b) => b.len(),
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_emit_is_dropped() {
        let mut out = CodecEvents::new();
        out.emit(b"");
        out.emit_bytes(Bytes::new());
        assert!(out.is_empty());
    }

    #[test]
    fn test_events_keep_order() {
        let mut out = CodecEvents::new();
        out.emit(b"hello");
        out.connected();
        out.error("bad frame");
        out.closed();

        let events: Vec<_> = out.drain().collect();
        assert_eq!(
            events,
            vec![
                CodecEvent::Outgoing(Bytes::from_static(b"hello")),
                CodecEvent::Connected,
                CodecEvent::Error("bad frame".to_string()),
                CodecEvent::Closed,
            ]
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_outgoing_len() {
        let mut out = CodecEvents::new();
        out.emit(b"abc");
        out.connected();
        out.emit_bytes(Bytes::from_static(b"de"));
        assert_eq!(out.outgoing_len(), 5);
        assert_eq!(out.len(), 3);
    }
}
