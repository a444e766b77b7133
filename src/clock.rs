//! Simulated clock source
//!
//! Provides the single logical timeline that drives every component:
//! partition windows, push records, compaction intervals and placement
//! cool-downs all read millisecond timestamps from a `SimClock`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Sentinel "far future" close time for partitions that are still open.
pub const TIME_END_MS: i64 = i64::MAX;

enum Mode {
    /// Time only moves when `advance` is called. Deterministic; used by
    /// tests and scripted simulation runs.
    Manual,
    /// Logical time is real elapsed time multiplied by a constant factor,
    /// so an hours-long cluster history plays out in seconds.
    Accelerated { start: Instant, factor: u32 },
}

/// A logical millisecond clock that never goes backward.
pub struct SimClock {
    mode: Mode,
    /// High-water mark: the largest timestamp we've ever returned.
    high_water_ms: AtomicI64,
}

impl SimClock {
    /// Create a manually-advanced clock starting at zero.
    pub fn manual() -> Self {
        Self {
            mode: Mode::Manual,
            high_water_ms: AtomicI64::new(0),
        }
    }

    /// Create a clock that runs at `factor` times real time.
    pub fn accelerated(factor: u32) -> Self {
        Self {
            mode: Mode::Accelerated {
                start: Instant::now(),
                factor: factor.max(1),
            },
            high_water_ms: AtomicI64::new(0),
        }
    }

    /// Returns the current logical time in milliseconds.
    pub fn now_ms(&self) -> i64 {
        match &self.mode {
            Mode::Manual => self.high_water_ms.load(Ordering::Acquire),
            Mode::Accelerated { start, factor } => {
                let elapsed = start.elapsed().as_millis() as i64 * *factor as i64;
                let prev = self.high_water_ms.fetch_max(elapsed, Ordering::AcqRel);
                prev.max(elapsed)
            }
        }
    }

    /// Move a manual clock forward by `ms` and return the new time.
    ///
    /// On an accelerated clock this is a no-op; time is driven by the
    /// wall clock there.
    pub fn advance(&self, ms: i64) -> i64 {
        debug_assert!(ms >= 0, "clock can only move forward");
        match &self.mode {
            Mode::Manual => self.high_water_ms.fetch_add(ms, Ordering::AcqRel) + ms,
            Mode::Accelerated { .. } => self.now_ms(),
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::manual()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = SimClock::manual();
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(clock.advance(1_500), 1_500);
        assert_eq!(clock.now_ms(), 1_500);
        assert_eq!(clock.advance(500), 2_000);
    }

    #[test]
    fn test_accelerated_clock_monotonic() {
        let clock = SimClock::accelerated(1000);
        let mut prev = -1i64;
        for _ in 0..100 {
            let ts = clock.now_ms();
            assert!(ts >= prev, "timestamps must never decrease");
            prev = ts;
        }
    }

    #[test]
    fn test_concurrent_monotonicity() {
        use std::sync::Arc;
        let clock = Arc::new(SimClock::accelerated(10_000));
        let mut handles = vec![];

        for _ in 0..4 {
            let c = clock.clone();
            handles.push(std::thread::spawn(move || {
                let mut prev = -1i64;
                for _ in 0..1000 {
                    let ts = c.now_ms();
                    assert!(ts >= prev);
                    prev = ts;
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
    }
}
