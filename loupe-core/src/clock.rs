//! Monotonic time source.

use std::time::Instant;

/// Source of the current time.
///
/// The store stamps every user-visible change with this clock and the
/// overlay compares against it, so tests can drive both with a
/// [`ManualClock`](crate::ManualClock).
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
