// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timer engine: arming, expiration tracking and owner-thread delivery.
//!
//! ```text
//! arm_timer ──> TimerRecord(Pending) ──> TimerSource.arm
//!                                             │ fire (service thread)
//!                                             v
//!              record: fire_count+1, Expired ──> owner ExpiredQueue.push
//!                                             └─> ready event signaled
//! owner thread: wait_multiple([ready]) ──> drain_expired(owner)
//! ```
//!
//! The fire callback only records, enqueues and signals. Everything else
//! happens on the owner thread.

mod engine;
mod queue;
mod record;
mod source;

#[cfg(test)]
mod tests;

pub use engine::{Delivery, TimerEngine};
pub use record::{ExpiredTimerEntry, TimerRecord, TimerState};
pub use source::{FireCallback, SourceId, ThreadTimerSource, TimerSource};

use std::fmt;

/// Timer identity. Issued from a monotonic counter and never reused, so a
/// late fire for a cancelled timer cannot hit a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Returned when arming with a zero period (benign no-op).
    pub const INVALID: TimerId = TimerId(0);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}
