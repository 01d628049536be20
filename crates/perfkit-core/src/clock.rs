//! A thin wrapper around `std::time::Instant` so the scheduling code in
//! `crate::source` reads in terms of "monotonic instant" the way the
//! specification does, rather than reaching for `Instant` directly
//! everywhere. Carries no state of its own — `Instant` is already
//! monotonic on every platform Rust supports.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    #[inline]
    pub fn now() -> Self {
        MonotonicInstant(Instant::now())
    }

    #[inline]
    pub fn checked_add(self, d: Duration) -> Self {
        MonotonicInstant(self.0.checked_add(d).unwrap_or(self.0))
    }

    /// `Duration` remaining until this instant, or `Duration::ZERO` if it
    /// has already passed.
    #[inline]
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    #[inline]
    pub fn has_elapsed(self) -> bool {
        Instant::now() >= self.0
    }

    #[inline]
    pub fn duration_since(self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> MonotonicInstant {
        self.checked_add(rhs)
    }
}
