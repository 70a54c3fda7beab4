// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Waitable primitives.
//!
//! A closed set of kinds sharing one signaled/unsignaled model and one
//! acquire/release contract:
//!
//! | Kind | Available when | Acquire | Release |
//! |------|----------------|---------|---------|
//! | `ExclusiveLock` | unowned | take ownership | owner only, frees |
//! | `RecursiveLock` | unowned or owned by caller | depth + 1 | depth - 1, frees at 0 |
//! | `Semaphore` | count > 0 | count - 1 | count + 1, fails at max |
//! | `Event` | signaled | auto-reset clears | sets |
//! | `SpinLock` | unowned | busy-wait | owner only |
//! | `Timer` | expired or cancelled | clears (auto-reset) | cancels schedule, sets |
//!
//! Every waitable primitive guards its state and its waiter back-references
//! with one fine-grained lock. Spinlocks are resource locks only and cannot
//! join a multi-object wait.

mod primitive;
mod table;

#[cfg(test)]
mod tests;

pub use primitive::{Primitive, PrimitiveStatus};
pub(crate) use primitive::{Slot, State};
pub use table::PrimitiveTable;

use std::fmt;

/// Opaque primitive identity, unique for the lifetime of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// Never issued by a table.
    pub const INVALID: Handle = Handle(0);

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

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

/// Kind of a waitable primitive, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// Mutual exclusion, no re-entry.
    ExclusiveLock,
    /// Mutual exclusion, re-entrant by the owner with a depth counter.
    RecursiveLock,
    /// Counting semaphore; `initial_count` must not exceed `max_count`.
    Semaphore { max_count: u32, initial_count: u32 },
    /// Signaling event, auto-reset (wakes one, reverts) or manual-reset.
    Event { auto_reset: bool },
    /// Busy-wait lock. Not waitable in a multi-object wait.
    SpinLock,
    /// Waitable timer bound to the creating thread. An auto-reset timer
    /// wakes one waiter per expiration; a manual-reset one stays signaled
    /// until [`set_timer`](crate::SyncContext::set_timer) re-arms it.
    Timer {
        periodic: bool,
        period_ms: u32,
        auto_reset: bool,
    },
}

impl PrimitiveKind {
    /// True if the kind can take part in a multi-object wait.
    #[inline]
    pub const fn is_waitable(self) -> bool {
        !matches!(self, PrimitiveKind::SpinLock)
    }

    #[inline]
    pub const fn is_lock(self) -> bool {
        matches!(
            self,
            PrimitiveKind::ExclusiveLock | PrimitiveKind::RecursiveLock | PrimitiveKind::SpinLock
        )
    }
}

/// Initial state at creation.
///
/// For lock kinds `Signaled` means "owned by the creating thread" (depth 1),
/// `Unsignaled` means free. For timers `Unsignaled` arms the timer right away
/// and `Signaled` leaves it expired and idle. Semaphores take their count from
/// [`PrimitiveKind::Semaphore`] and ignore this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialState {
    Signaled,
    #[default]
    Unsignaled,
}
