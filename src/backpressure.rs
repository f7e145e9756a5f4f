//! Backpressure signal for the output queue.
//!
//! The output queue lives on the session's driver task, but callers that
//! produce data (through [`Session::with_codec`](crate::Session::with_codec))
//! run elsewhere. [`OutputPressure`] shares the number of queued bytes between
//! both sides with a lock-free counter so producers can slow down before
//! memory grows without bound.
//!
//! # Configuration
//!
//! - `high_watermark`: queued bytes at which backpressure is active (default: 1 MiB)
//! - Timeout: how long [`OutputPressure::wait_for_drain`] waits (default: 5s)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, SessionError};

/// Default number of queued bytes before backpressure kicks in.
pub const DEFAULT_HIGH_WATERMARK: usize = 1024 * 1024;

/// Default time to wait for the queue to drain.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between drain checks.
const CHECK_INTERVAL: Duration = Duration::from_micros(100);

/// Shared view of how many bytes are waiting in an output queue.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct OutputPressure {
    /// Bytes currently queued.
    queued: Arc<AtomicUsize>,
    /// Threshold for `is_active`.
    high_watermark: usize,
    /// Timeout for `wait_for_drain`.
    timeout: Duration,
}

impl OutputPressure {
    /// Create a tracker with the given high watermark.
    pub fn new(high_watermark: usize) -> Self {
        Self::with_timeout(high_watermark, DEFAULT_TIMEOUT)
    }

    /// Create a tracker with a custom drain timeout.
    pub fn with_timeout(high_watermark: usize, timeout: Duration) -> Self {
        Self {
            queued: Arc::new(AtomicUsize::new(0)),
            high_watermark,
            timeout,
        }
    }

    /// Record bytes added to the queue.
    #[inline]
    pub(crate) fn add(&self, bytes: usize) {
        self.queued.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Record bytes removed from the queue.
    #[inline]
    pub(crate) fn remove(&self, bytes: usize) {
        self.queued.fetch_sub(bytes, Ordering::AcqRel);
    }

    /// Forget everything queued (transport released).
    pub(crate) fn reset(&self) {
        self.queued.store(0, Ordering::Release);
    }

    /// Bytes currently queued.
    #[inline]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Threshold at which backpressure becomes active.
    #[inline]
    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.queued() >= self.high_watermark
    }

    /// Wait until the queue is below the high watermark.
    ///
    /// Returns `Err(BackpressureTimeout)` if that does not happen in time.
    pub async fn wait_for_drain(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }

        let start = Instant::now();
        loop {
            if !self.is_active() {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(SessionError::BackpressureTimeout);
            }

            tokio::time::sleep(CHECK_INTERVAL).await;
        }
    }
}

impl Default for OutputPressure {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_WATERMARK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let pressure = OutputPressure::default();
        assert_eq!(pressure.high_watermark(), DEFAULT_HIGH_WATERMARK);
        assert_eq!(pressure.queued(), 0);
        assert!(!pressure.is_active());
    }

    #[test]
    fn test_add_remove() {
        let pressure = OutputPressure::new(100);

        pressure.add(60);
        assert_eq!(pressure.queued(), 60);
        assert!(!pressure.is_active());

        pressure.add(40);
        assert!(pressure.is_active());

        pressure.remove(30);
        assert_eq!(pressure.queued(), 70);
        assert!(!pressure.is_active());
    }

    #[test]
    fn test_clone_shares_state() {
        let a = OutputPressure::new(10);
        let b = a.clone();

        a.add(5);
        assert_eq!(b.queued(), 5);

        b.reset();
        assert_eq!(a.queued(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_drain_immediate() {
        let pressure = OutputPressure::new(10);
        pressure.add(3);
        assert!(pressure.wait_for_drain().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_drain_timeout() {
        let pressure = OutputPressure::with_timeout(1, Duration::from_millis(10));
        pressure.add(1);

        let start = Instant::now();
        let result = pressure.wait_for_drain().await;

        assert!(matches!(result, Err(SessionError::BackpressureTimeout)));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_drain_times_out_with_paused_clock() {
        let pressure = OutputPressure::with_timeout(1, Duration::from_secs(5));
        pressure.add(1);

        let start = Instant::now();
        let result = pressure.wait_for_drain().await;

        assert!(matches!(result, Err(SessionError::BackpressureTimeout)));
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_for_drain_after_release() {
        let pressure = OutputPressure::with_timeout(1, Duration::from_secs(1));
        pressure.add(1);

        let other = pressure.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            other.remove(1);
        });

        assert!(pressure.wait_for_drain().await.is_ok());
    }
}
