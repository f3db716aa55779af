//! Pausable game clock.
//!
//! The clock never reads time itself: every call takes a `now_ms` reading from
//! a [`TimeSource`](crate::time::TimeSource), which keeps it deterministic
//! under test and lets the host decide where time comes from. Readings must be
//! monotonic; all arithmetic saturates so a stale reading yields a frozen
//! value rather than a negative one.

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackClock {
    started_at_ms: Option<u64>,
    paused_accumulated_ms: u64,
    paused_at_ms: Option<u64>,
}

impl PlaybackClock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            started_at_ms: None,
            paused_accumulated_ms: 0,
            paused_at_ms: None,
        }
    }

    /// Start counting from zero.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the clock is already started.
    pub fn start(&mut self, now_ms: u64) -> Result<()> {
        if self.started_at_ms.is_some() {
            return Err(CoreError::InvalidState {
                action: "start the clock",
                state: "already started".into(),
            });
        }
        self.started_at_ms = Some(now_ms);
        self.paused_accumulated_ms = 0;
        self.paused_at_ms = None;
        Ok(())
    }

    /// Freeze elapsed time. No-op if already paused or never started.
    pub fn pause(&mut self, now_ms: u64) {
        if self.started_at_ms.is_some() && self.paused_at_ms.is_none() {
            self.paused_at_ms = Some(now_ms);
        }
    }

    /// Continue from the frozen value. No-op unless paused.
    pub fn resume(&mut self, now_ms: u64) {
        if let Some(paused_at) = self.paused_at_ms.take() {
            self.paused_accumulated_ms = self
                .paused_accumulated_ms
                .saturating_add(now_ms.saturating_sub(paused_at));
        }
    }

    /// Game time in milliseconds: time since start minus time spent paused.
    /// Zero before the clock is started.
    #[must_use]
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        let Some(started_at) = self.started_at_ms else {
            return 0;
        };
        let now = self.paused_at_ms.unwrap_or(now_ms);
        now.saturating_sub(started_at)
            .saturating_sub(self.paused_accumulated_ms)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started_at_ms.is_some()
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused_at_ms.is_some()
    }

    #[must_use]
    pub const fn paused_accumulated_ms(&self) -> u64 {
        self.paused_accumulated_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unstarted_clock_reads_zero() {
        let clock = PlaybackClock::new();
        assert_eq!(clock.elapsed_ms(5000), 0);
        assert!(!clock.is_started());
    }

    #[test]
    fn test_elapsed_while_running() {
        let mut clock = PlaybackClock::new();
        clock.start(1000).unwrap();
        assert_eq!(clock.elapsed_ms(1000), 0);
        assert_eq!(clock.elapsed_ms(3500), 2500);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut clock = PlaybackClock::new();
        clock.start(0).unwrap();
        assert!(matches!(clock.start(10), Err(CoreError::InvalidState { .. })));
        assert_eq!(clock.elapsed_ms(100), 100);
    }

    #[test]
    fn test_pause_freezes_elapsed() {
        let mut clock = PlaybackClock::new();
        clock.start(0).unwrap();
        clock.pause(2000);
        assert!(clock.is_paused());
        assert_eq!(clock.elapsed_ms(2500), 2000);
        assert_eq!(clock.elapsed_ms(9000), 2000);
    }

    #[test]
    fn test_pause_twice_keeps_first_boundary() {
        let mut clock = PlaybackClock::new();
        clock.start(0).unwrap();
        clock.pause(2000);
        clock.pause(3000);
        assert_eq!(clock.elapsed_ms(4000), 2000);
    }

    #[test]
    fn test_resume_accumulates_pause() {
        let mut clock = PlaybackClock::new();
        clock.start(0).unwrap();
        clock.pause(2000);
        clock.resume(5000);
        assert_eq!(clock.paused_accumulated_ms(), 3000);
        assert_eq!(clock.elapsed_ms(5000), 2000);
        assert_eq!(clock.elapsed_ms(6000), 3000);

        clock.pause(7000);
        clock.resume(8000);
        assert_eq!(clock.elapsed_ms(9000), 5000);
    }

    #[test]
    fn test_resume_without_pause_is_noop() {
        let mut clock = PlaybackClock::new();
        clock.start(0).unwrap();
        clock.resume(500);
        assert_eq!(clock.elapsed_ms(1000), 1000);
    }

    #[test]
    fn test_pause_before_start_is_noop() {
        let mut clock = PlaybackClock::new();
        clock.pause(100);
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_stale_reading_does_not_underflow() {
        let mut clock = PlaybackClock::new();
        clock.start(1000).unwrap();
        assert_eq!(clock.elapsed_ms(500), 0);
    }

    #[test]
    fn test_reset_allows_restart() {
        let mut clock = PlaybackClock::new();
        clock.start(0).unwrap();
        clock.pause(100);
        clock.reset();
        assert!(!clock.is_started());
        assert!(!clock.is_paused());
        clock.start(200).unwrap();
        assert_eq!(clock.elapsed_ms(300), 100);
    }
}
