// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local-host timestamps and wait deadlines.

use crate::config::WAIT_INFINITE;
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock timestamp in nanoseconds since the Unix epoch.
///
/// Carried in expiration records as two 32-bit halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    /// Current wall-clock time. Clocks set before the epoch read as zero.
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(nanos)
    }

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn from_parts(high: u32, low: u32) -> Self {
        Self(((high as u64) << 32) | low as u64)
    }

    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Upper 32 bits.
    #[inline]
    pub const fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Lower 32 bits.
    #[inline]
    pub const fn low(self) -> u32 {
        self.0 as u32
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09}",
            self.0 / 1_000_000_000,
            self.0 % 1_000_000_000
        )
    }
}

/// Monotonic deadline for a millisecond timeout; `None` for [`WAIT_INFINITE`].
pub fn deadline_after(timeout_ms: u32) -> Option<Instant> {
    if timeout_ms == WAIT_INFINITE {
        return None;
    }
    Instant::now().checked_add(Duration::from_millis(u64::from(timeout_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_roundtrip() {
        let ts = Timestamp::from_nanos(0x1234_5678_9ABC_DEF0);
        assert_eq!(ts.high(), 0x1234_5678);
        assert_eq!(ts.low(), 0x9ABC_DEF0);
        assert_eq!(Timestamp::from_parts(ts.high(), ts.low()), ts);
    }

    #[test]
    fn test_now_is_monotone_enough() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(a.as_nanos() > 0);
        assert!(b >= a || a.saturating_since(b) < Duration::from_millis(100));
    }

    #[test]
    fn test_deadline_infinite() {
        assert!(deadline_after(WAIT_INFINITE).is_none());
        let d = deadline_after(0).expect("finite deadline");
        assert!(d <= Instant::now());
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::from_nanos(1_500_000_000).to_string(), "1.500000000");
    }
}
