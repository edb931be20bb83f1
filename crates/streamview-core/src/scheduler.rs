//! Timers and time sources.
//!
//! The controller never sleeps. It hands [`TimerTask`]s to a [`TaskScheduler`]
//! and gets them back through `fire` on the owner thread once the delay elapses.
//! Tasks are never cancelled; each one carries a generation that is checked when
//! it fires.

use std::time::{Duration, Instant};

/// A deferred continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerTask {
    /// Verify that playback produced video output
    ResumeCheck { generation: u64 },
    /// Deferred `play()` after re-attaching on foreground
    DeferredPlay { generation: u64 },
}

/// Schedules a task to be delivered back to the owner thread after `delay`.
pub trait TaskScheduler: Send {
    fn schedule(&mut self, delay: Duration, task: TimerTask);
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
