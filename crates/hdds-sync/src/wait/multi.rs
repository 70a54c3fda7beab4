// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking multi-object wait.

use super::registry::{AllAttempt, WaitRegistry, WaiterStatus};
use crate::core::ThreadId;
use crate::error::{Error, Result};
use crate::sync::{Handle, Primitive};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of [`wait_multiple`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Wait-any: the primitive at this index was signaled and consumed.
    Index(usize),
    /// Wait-all: every primitive was signaled and consumed.
    AllSignaled,
    /// Deadline passed first.
    TimedOut,
    /// Alertable wait interrupted by [`WaitRegistry::interrupt`].
    Interrupted,
}

impl WaitResult {
    #[inline]
    pub fn is_signaled(self) -> bool {
        matches!(self, WaitResult::Index(_) | WaitResult::AllSignaled)
    }
}

/// Outcome of a single-object acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired,
    TimedOut,
}

/// Check a wait set before anything is registered.
pub fn validate_wait_set(handles: &[Handle], max: usize) -> Result<()> {
    if handles.is_empty() {
        return Err(Error::EmptyWaitSet);
    }
    if handles.len() > max {
        return Err(Error::TooManyObjects {
            requested: handles.len(),
            max,
        });
    }
    let mut seen = HashSet::with_capacity(handles.len());
    for handle in handles {
        if !seen.insert(*handle) {
            return Err(Error::DuplicateHandle(*handle));
        }
    }
    Ok(())
}

/// Block the calling thread until one (`wait_all == false`) or all of
/// `primitives` are signaled, the deadline passes, or, for an alertable
/// wait, the thread is interrupted.
///
/// Signaled primitives are consumed on return: locks are owned by the
/// caller, semaphores decremented, auto-reset events and timers cleared.
/// Every exit path deregisters the waiter from all primitives; nothing is
/// consumed on timeout or interrupt.
pub fn wait_multiple(
    registry: &WaitRegistry,
    primitives: &[Arc<Primitive>],
    wait_all: bool,
    deadline: Option<Instant>,
    alertable: bool,
) -> Result<WaitResult> {
    let caller = ThreadId::current();

    // Everything that can fail is checked before registration.
    for primitive in primitives {
        let slot = primitive.lock_slot()?;
        if slot.destroyed {
            return Err(Error::PrimitiveDestroyed(primitive.handle()));
        }
        slot.state.check_entry(primitive.handle(), caller)?;
    }

    let signal = registry.signal_for_waiter(caller)?;
    signal.clear();

    let id = registry.register(Arc::clone(&signal), primitives.len(), wait_all);
    for (index, primitive) in primitives.iter().enumerate() {
        if !registry.attach(id, index, caller, primitive) {
            break;
        }
    }

    loop {
        match registry.status(id) {
            Some(WaiterStatus::Fired(index)) => {
                registry.retire(id, primitives);
                return Ok(WaitResult::Index(index));
            }
            Some(WaiterStatus::AllSatisfied) => {
                if registry.try_acquire_all(id, caller, primitives) == AllAttempt::Acquired {
                    registry.retire(id, primitives);
                    return Ok(WaitResult::AllSignaled);
                }
                // Missing members recorded; re-read status before sleeping.
                continue;
            }
            Some(WaiterStatus::Acquired) => {
                registry.retire(id, primitives);
                return Ok(WaitResult::AllSignaled);
            }
            Some(WaiterStatus::Destroyed(handle)) => {
                registry.retire(id, primitives);
                return Err(Error::PrimitiveDestroyed(handle));
            }
            Some(WaiterStatus::Waiting) => {}
            None => {
                return Err(Error::Fatal(format!("waiter {} vanished from registry", id)));
            }
        }

        if alertable && signal.take_alert() {
            return abandon(registry, id, primitives, WaitResult::Interrupted);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return abandon(registry, id, primitives, WaitResult::TimedOut);
        }

        signal.wait_until(deadline);
    }
}

/// Retire a waiter that gives up, honoring a delivery that raced in.
fn abandon(
    registry: &WaitRegistry,
    id: u64,
    primitives: &[Arc<Primitive>],
    outcome: WaitResult,
) -> Result<WaitResult> {
    match registry.retire(id, primitives) {
        Some(WaiterStatus::Fired(index)) => Ok(WaitResult::Index(index)),
        Some(WaiterStatus::Acquired) => Ok(WaitResult::AllSignaled),
        Some(WaiterStatus::Destroyed(handle)) => Err(Error::PrimitiveDestroyed(handle)),
        _ => Ok(outcome),
    }
}
