//! [`StallGuard`] – consecutive-stall detector for the frame source.
//!
//! A single stalled acquisition (no complete frame within the tick budget) is
//! transient: the control loop keeps commanding the servos.  The guard counts
//! stalls in a row and reports when the streak exceeds the configured limit,
//! at which point the camera is treated as gone.
//!
//! # Example
//!
//! ```rust
//! use owl_runtime::stall_guard::StallGuard;
//!
//! let mut guard = StallGuard::new(2);
//!
//! assert!(!guard.record_stall());
//! assert!(!guard.record_stall());
//! assert!(guard.record_stall()); // third in a row → source is gone
//!
//! // Any delivered frame breaks the streak.
//! guard.record_frame();
//! assert!(!guard.record_stall());
//! ```

/// Counts consecutive frame-source stalls.
#[derive(Debug, Clone)]
pub struct StallGuard {
    /// Stalls in a row that are still tolerated.
    limit: u32,
    streak: u32,
    total: u64,
}

impl StallGuard {
    /// `limit` is the largest tolerated streak.  A limit of 0 makes the very
    /// first stall fatal.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            streak: 0,
            total: 0,
        }
    }

    /// Record a stalled tick.  Returns `true` once the streak exceeds the
    /// limit.
    pub fn record_stall(&mut self) -> bool {
        self.streak = self.streak.saturating_add(1);
        self.total += 1;
        self.is_exhausted()
    }

    /// Record a delivered frame, ending any streak.
    pub fn record_frame(&mut self) {
        self.streak = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.streak > self.limit
    }

    /// Current streak length.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Stalls seen since construction.
    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_stalls_are_tolerated() {
        let mut guard = StallGuard::new(2);
        for _ in 0..10 {
            assert!(!guard.record_stall());
            guard.record_frame();
        }
        assert_eq!(guard.total(), 10);
        assert_eq!(guard.streak(), 0);
    }

    #[test]
    fn trips_only_past_the_limit() {
        let mut guard = StallGuard::new(3);
        assert!(!guard.record_stall());
        assert!(!guard.record_stall());
        assert!(!guard.record_stall());
        assert!(guard.record_stall());
        assert!(guard.record_stall()); // stays tripped
        assert!(guard.is_exhausted());
    }

    #[test]
    fn zero_limit_trips_on_first_stall() {
        let mut guard = StallGuard::new(0);
        assert!(guard.record_stall());
    }
}
