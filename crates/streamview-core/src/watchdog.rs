//! Resume watchdog.
//!
//! After long backgrounding a decoder often reports Playing while never
//! producing a frame. Every play attempt arms a single-shot check; if the
//! session still has no video output when the check fires, the controller
//! reloads the stream.

use std::time::Duration;

/// Monotonic generation counter.
///
/// A scheduled continuation captures the value returned by [`next`](Self::next)
/// and is honored only if it still matches [`current`](Self::current) when it
/// fires.
#[derive(Debug, Default, Clone)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    /// Starts a new generation and returns it.
    pub fn next(&mut self) -> u64 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    /// Invalidates every outstanding generation.
    pub fn invalidate(&mut self) {
        self.current = self.current.wrapping_add(1);
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current == generation
    }
}

/// Delay policy for the resume check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTiming {
    /// Delay when the view was away for less than `reload_threshold`
    pub check_delay: Duration,
    /// Delay after longer absences (decoders need longer to spin up)
    pub check_delay_long: Duration,
    pub reload_threshold: Duration,
}

impl Default for WatchdogTiming {
    fn default() -> Self {
        Self {
            check_delay: Duration::from_millis(400),
            check_delay_long: Duration::from_millis(1000),
            reload_threshold: Duration::from_millis(2000),
        }
    }
}

/// Generation-tagged single-shot resume check.
#[derive(Debug, Default)]
pub struct ResumeWatchdog {
    generations: GenerationCounter,
    timing: WatchdogTiming,
}

impl ResumeWatchdog {
    pub fn new(timing: WatchdogTiming) -> Self {
        Self {
            generations: GenerationCounter::default(),
            timing,
        }
    }

    pub fn timing(&self) -> WatchdogTiming {
        self.timing
    }

    /// Starts a new check generation.
    ///
    /// Returns the generation and how long to wait before checking.
    pub fn arm(&mut self, elapsed_background: Duration) -> (u64, Duration) {
        let generation = self.generations.next();
        let delay = if elapsed_background < self.timing.reload_threshold {
            self.timing.check_delay
        } else {
            self.timing.check_delay_long
        };
        tracing::debug!(
            "resume check gen {generation} armed ({}ms after {}ms away)",
            delay.as_millis(),
            elapsed_background.as_millis()
        );
        (generation, delay)
    }

    /// Cancels any outstanding check.
    pub fn invalidate(&mut self) {
        self.generations.invalidate();
    }

    /// Returns true if a check tagged `generation` should still run.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generations.is_current(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_selection() {
        let mut wd = ResumeWatchdog::default();
        assert_eq!(wd.arm(Duration::ZERO).1, Duration::from_millis(400));
        assert_eq!(
            wd.arm(Duration::from_millis(1999)).1,
            Duration::from_millis(400)
        );
        // A reload records exactly the threshold, which must pick the long delay.
        assert_eq!(wd.arm(Duration::from_secs(2)).1, Duration::from_millis(1000));
    }

    #[test]
    fn test_only_latest_generation_is_current() {
        let mut wd = ResumeWatchdog::default();
        let (g1, _) = wd.arm(Duration::ZERO);
        assert!(wd.is_current(g1));

        let (g2, _) = wd.arm(Duration::ZERO);
        assert!(!wd.is_current(g1));
        assert!(wd.is_current(g2));

        wd.invalidate();
        assert!(!wd.is_current(g2));
    }

    #[test]
    fn test_generation_counter() {
        let mut c = GenerationCounter::default();
        let g = c.next();
        assert_eq!(c.current(), g);
        c.invalidate();
        assert!(!c.is_current(g));
        assert!(c.next() > g);
    }
}
