//! Error types for sessionwire.

use thiserror::Error;

/// Main error type for all session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hostname could not be resolved.
    #[error("Failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    /// Hostname resolved to an empty address list.
    #[error("No addresses found for {0}")]
    NoAddresses(String),

    /// Every candidate address refused or timed out.
    #[error("No reachable address after {attempts} attempts: {last_error}")]
    NoReachableAddress { attempts: usize, last_error: String },

    /// Protocol error reported by the codec.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer went away while the session was live.
    #[error("Connection lost")]
    ConnectionLost,

    /// The session already reached a terminal state.
    #[error("Session closed")]
    SessionClosed,

    /// Output queue stayed above the high watermark for too long.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;
