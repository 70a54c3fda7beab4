// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::TimerId;
use crate::core::{ThreadId, Timestamp};

/// Engine-side timer state.
///
/// `Idle -> Pending` on arm, `Pending -> Expired` on fire,
/// `Expired -> Pending` on periodic re-arm or restart, any state `-> Idle`
/// on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Pending,
    Expired,
}

/// Bookkeeping for one timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRecord {
    pub timer_id: TimerId,
    pub owner: ThreadId,
    pub periodic: bool,
    pub period_ms: u32,
    pub state: TimerState,
    pub started_at: Timestamp,
    pub last_expired_at: Timestamp,
    pub fire_count: u64,
}

impl TimerRecord {
    pub(crate) fn new(timer_id: TimerId, owner: ThreadId) -> Self {
        Self {
            timer_id,
            owner,
            periodic: false,
            period_ms: 0,
            state: TimerState::Idle,
            started_at: Timestamp::ZERO,
            last_expired_at: Timestamp::ZERO,
            fire_count: 0,
        }
    }

    pub(crate) fn arm(&mut self, period_ms: u32, periodic: bool, now: Timestamp) {
        self.period_ms = period_ms;
        self.periodic = periodic;
        self.state = TimerState::Pending;
        self.started_at = now;
    }

    /// Record one expiration; periodic timers are immediately pending again.
    pub(crate) fn fire(&mut self, now: Timestamp) -> ExpiredTimerEntry {
        self.fire_count += 1;
        self.state = TimerState::Expired;
        self.last_expired_at = now;
        let entry = ExpiredTimerEntry::new(self.timer_id, now, self.fire_count);
        if self.periodic {
            self.state = TimerState::Pending;
        }
        entry
    }

    pub(crate) fn stop(&mut self) {
        self.state = TimerState::Idle;
    }
}

/// One expiration, delivered to the owner thread in fire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredTimerEntry {
    pub timer_id: TimerId,
    /// Expiration timestamp, upper 32 bits
    pub high: u32,
    /// Expiration timestamp, lower 32 bits
    pub low: u32,
    /// Fire count of the timer including this expiration
    pub fire_count: u64,
}

impl ExpiredTimerEntry {
    pub fn new(timer_id: TimerId, expired_at: Timestamp, fire_count: u64) -> Self {
        Self {
            timer_id,
            high: expired_at.high(),
            low: expired_at.low(),
            fire_count,
        }
    }

    #[inline]
    pub fn expired_at(&self) -> Timestamp {
        Timestamp::from_parts(self.high, self.low)
    }
}
