// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by waitable primitives, the wait registry and the timer engine.
//!
//! Timeouts and interrupted waits are not errors: they come back as
//! [`WaitResult::TimedOut`](crate::WaitResult::TimedOut) and
//! [`WaitResult::Interrupted`](crate::WaitResult::Interrupted).

use crate::core::ThreadId;
use crate::sync::Handle;
use crate::timer::TimerId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by HDDS synchronization operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Contract violations (caller misuse, reported synchronously)
    // ========================================================================
    /// Semaphore released while already at its maximum count.
    SemaphoreOverflow { max_count: u32 },
    /// Lock released by a thread that does not own it.
    NotOwner { owner: Option<ThreadId>, caller: ThreadId },
    /// Non-recursive lock acquired again by its current owner.
    NonRecursiveReentry(Handle),
    /// `reset()` called on something other than a manual-reset event.
    ResetNotSupported(Handle),
    /// `try_signal()` called on a lock kind.
    SignalNotSupported(Handle),
    /// Primitive kind cannot take part in a multi-object wait (spinlocks).
    NotWaitable(Handle),
    /// Primitive was destroyed while (or before) being waited on.
    PrimitiveDestroyed(Handle),
    /// Handle was never issued or has already been destroyed.
    UnknownHandle(Handle),
    /// Timer id was never issued or has already been cancelled.
    UnknownTimer(TimerId),
    /// Timer belongs to a timer primitive and lives as long as it does.
    TimerBoundToPrimitive { timer: TimerId, handle: Handle },
    /// Same handle passed twice in one wait set.
    DuplicateHandle(Handle),
    /// Wait set was empty.
    EmptyWaitSet,
    /// Operation must be called from the owning thread.
    WrongThread { expected: ThreadId, caller: ThreadId },
    /// Configuration rejected by validation.
    InvalidConfig(String),

    // ========================================================================
    // Resource exhaustion
    // ========================================================================
    /// Wait set larger than the configured maximum.
    TooManyObjects { requested: usize, max: usize },
    /// OS-level timer source could not be created or armed.
    TimerSourceFailed(String),

    // ========================================================================
    // Fatal
    // ========================================================================
    /// Underlying OS primitive could not be created.
    Fatal(String),
    /// I/O error from a platform call.
    Io(std::io::Error),
}

impl Error {
    /// True for misuse errors the caller can fix.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::SemaphoreOverflow { .. }
                | Error::NotOwner { .. }
                | Error::NonRecursiveReentry(_)
                | Error::ResetNotSupported(_)
                | Error::SignalNotSupported(_)
                | Error::NotWaitable(_)
                | Error::PrimitiveDestroyed(_)
                | Error::UnknownHandle(_)
                | Error::UnknownTimer(_)
                | Error::TimerBoundToPrimitive { .. }
                | Error::DuplicateHandle(_)
                | Error::EmptyWaitSet
                | Error::WrongThread { .. }
                | Error::InvalidConfig(_)
        )
    }

    /// True when a bounded resource ran out.
    #[must_use]
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            Error::TooManyObjects { .. } | Error::TimerSourceFailed(_)
        )
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Contract violations
            Error::SemaphoreOverflow { max_count } => {
                write!(f, "Semaphore released at maximum count {}", max_count)
            }
            Error::NotOwner { owner, caller } => match owner {
                Some(owner) => write!(f, "Thread {} released lock owned by {}", caller, owner),
                None => write!(f, "Thread {} released unowned lock", caller),
            },
            Error::NonRecursiveReentry(h) => {
                write!(f, "Non-recursive lock {} re-entered by its owner", h)
            }
            Error::ResetNotSupported(h) => {
                write!(f, "Primitive {} is not a manual-reset event", h)
            }
            Error::SignalNotSupported(h) => write!(f, "Primitive {} cannot be signaled", h),
            Error::NotWaitable(h) => write!(f, "Primitive {} cannot be waited on", h),
            Error::PrimitiveDestroyed(h) => write!(f, "Primitive {} was destroyed", h),
            Error::UnknownHandle(h) => write!(f, "Unknown primitive handle {}", h),
            Error::UnknownTimer(id) => write!(f, "Unknown timer {}", id),
            Error::TimerBoundToPrimitive { timer, handle } => {
                write!(f, "Timer {} is owned by primitive {}", timer, handle)
            }
            Error::DuplicateHandle(h) => write!(f, "Handle {} appears twice in wait set", h),
            Error::EmptyWaitSet => write!(f, "Wait set is empty"),
            Error::WrongThread { expected, caller } => write!(
                f,
                "Operation requires owner thread {} (called from {})",
                expected, caller
            ),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            // Resource exhaustion
            Error::TooManyObjects { requested, max } => write!(
                f,
                "Wait set of {} objects exceeds maximum {}",
                requested, max
            ),
            Error::TimerSourceFailed(msg) => write!(f, "Timer source failure: {}", msg),
            // Fatal
            Error::Fatal(msg) => write!(f, "Fatal: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
