//! Millisecond conversions and monotonic time sources.
//!
//! Game time is measured in whole milliseconds read from a monotonic source,
//! so wall-clock adjustments never move the playback clock backwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Extension trait for saturating Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    fn as_millis_u64(&self) -> u64;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A monotonic millisecond counter.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin. Never decreases.
    fn now_ms(&self) -> u64;
}

/// Time source backed by tokio's [`Instant`], so it also follows tokio's
/// paused clock in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimeSource {
    origin: Instant,
}

impl MonotonicTimeSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis_u64()
    }
}

/// Manually advanced time source for tests and replays.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<AtomicU64>,
}

impl ManualTimeSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Move to `ms` unless that would go backwards.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_millis_u64() {
        assert_eq!(Duration::from_millis(1234).as_millis_u64(), 1234);
        assert_eq!(Duration::ZERO.as_millis_u64(), 0);
    }

    #[test]
    fn test_as_millis_u64_saturates() {
        assert_eq!(Duration::MAX.as_millis_u64(), u64::MAX);
    }

    #[test]
    fn test_manual_time_source_shared_between_clones() {
        let source = ManualTimeSource::new();
        let clone = source.clone();
        source.advance(250);
        assert_eq!(clone.now_ms(), 250);
    }

    #[test]
    fn test_manual_time_source_never_goes_back() {
        let source = ManualTimeSource::new();
        source.set(1000);
        source.set(400);
        assert_eq!(source.now_ms(), 1000);
    }

    #[test]
    fn test_monotonic_time_source_does_not_decrease() {
        let source = MonotonicTimeSource::new();
        let first = source.now_ms();
        let second = source.now_ms();
        assert!(second >= first);
    }
}
