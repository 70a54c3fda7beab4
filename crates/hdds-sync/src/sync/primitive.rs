// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::{Handle, InitialState, PrimitiveKind};
use crate::core::ThreadId;
use crate::error::{Error, Result};
use crate::timer::TimerId;
use crate::wait::{WaitRegistry, WaiterRef};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Signal state of a waitable primitive.
#[derive(Debug)]
pub(crate) enum State {
    Lock {
        recursive: bool,
        owner: Option<ThreadId>,
        depth: u32,
    },
    Semaphore {
        max: u32,
        current: u32,
    },
    Event {
        auto_reset: bool,
        signaled: bool,
    },
    Timer {
        auto_reset: bool,
        signaled: bool,
        /// Schedule cancelled by a release; stays signaled for every waiter
        cancelled: bool,
        timer_id: TimerId,
    },
}

impl State {
    /// Reject waits that can never complete for `caller`.
    pub(crate) fn check_entry(&self, handle: Handle, caller: ThreadId) -> Result<()> {
        match self {
            State::Lock {
                recursive: false,
                owner: Some(owner),
                ..
            } if *owner == caller => Err(Error::NonRecursiveReentry(handle)),
            _ => Ok(()),
        }
    }

    /// True if `caller` could consume this primitive right now.
    pub(crate) fn is_consumable_for(&self, caller: ThreadId) -> bool {
        match self {
            State::Lock {
                recursive, owner, ..
            } => match owner {
                None => true,
                Some(owner) => *recursive && *owner == caller,
            },
            State::Semaphore { current, .. } => *current > 0,
            State::Event { signaled, .. } | State::Timer { signaled, .. } => *signaled,
        }
    }

    /// Take the primitive on behalf of `caller`. Only valid after
    /// `is_consumable_for(caller)` returned true under the same lock.
    pub(crate) fn consume(&mut self, caller: ThreadId) {
        match self {
            State::Lock { owner, depth, .. } => {
                *owner = Some(caller);
                *depth += 1;
            }
            State::Semaphore { current, .. } => {
                *current = current.saturating_sub(1);
            }
            State::Event {
                auto_reset: true,
                signaled,
            } => *signaled = false,
            State::Event { .. } => {}
            State::Timer {
                auto_reset: true,
                cancelled: false,
                signaled,
                ..
            } => *signaled = false,
            State::Timer { .. } => {}
        }
    }
}

/// Primitive state plus the back-references of threads waiting on it.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) state: State,
    pub(crate) waiters: Vec<WaiterRef>,
    pub(crate) destroyed: bool,
}

#[derive(Debug)]
struct SpinLock {
    /// Raw owner thread id, 0 when free
    owner: AtomicU64,
}

#[derive(Debug)]
enum Body {
    Waitable(Mutex<Slot>),
    Spin(SpinLock),
}

/// Point-in-time view of a primitive's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveStatus {
    Lock {
        owner: Option<ThreadId>,
        depth: u32,
    },
    Semaphore {
        max_count: u32,
        current_count: u32,
    },
    Event {
        signaled: bool,
    },
    Timer {
        signaled: bool,
        timer_id: TimerId,
    },
}

impl PrimitiveStatus {
    /// True if a fresh acquirer from another thread would succeed now.
    pub fn is_available(&self) -> bool {
        match self {
            PrimitiveStatus::Lock { owner, .. } => owner.is_none(),
            PrimitiveStatus::Semaphore { current_count, .. } => *current_count > 0,
            PrimitiveStatus::Event { signaled } | PrimitiveStatus::Timer { signaled, .. } => {
                *signaled
            }
        }
    }
}

/// A waitable primitive.
#[derive(Debug)]
pub struct Primitive {
    handle: Handle,
    kind: PrimitiveKind,
    body: Body,
}

impl Primitive {
    pub(crate) fn new(
        handle: Handle,
        kind: PrimitiveKind,
        initial: InitialState,
        creator: ThreadId,
    ) -> Result<Self> {
        let owned = initial == InitialState::Signaled;
        let state = match kind {
            PrimitiveKind::ExclusiveLock | PrimitiveKind::RecursiveLock => State::Lock {
                recursive: kind == PrimitiveKind::RecursiveLock,
                owner: owned.then_some(creator),
                depth: u32::from(owned),
            },
            PrimitiveKind::Semaphore {
                max_count,
                initial_count,
            } => {
                if max_count == 0 {
                    return Err(Error::InvalidConfig(
                        "semaphore max_count must be > 0".to_string(),
                    ));
                }
                if initial_count > max_count {
                    return Err(Error::SemaphoreOverflow { max_count });
                }
                State::Semaphore {
                    max: max_count,
                    current: initial_count,
                }
            }
            PrimitiveKind::Event { auto_reset } => State::Event {
                auto_reset,
                signaled: owned,
            },
            PrimitiveKind::Timer { auto_reset, .. } => State::Timer {
                auto_reset,
                signaled: owned,
                cancelled: false,
                timer_id: TimerId::INVALID,
            },
            PrimitiveKind::SpinLock => {
                let owner = if owned { creator.as_raw() } else { 0 };
                return Ok(Self {
                    handle,
                    kind,
                    body: Body::Spin(SpinLock {
                        owner: AtomicU64::new(owner),
                    }),
                });
            }
        };

        Ok(Self {
            handle,
            kind,
            body: Body::Waitable(Mutex::new(Slot {
                state,
                waiters: Vec::new(),
                destroyed: false,
            })),
        })
    }

    #[inline]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[inline]
    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }

    /// Lock the slot of a waitable primitive.
    pub(crate) fn lock_slot(&self) -> Result<MutexGuard<'_, Slot>> {
        match &self.body {
            Body::Waitable(slot) => Ok(slot.lock()),
            Body::Spin(_) => Err(Error::NotWaitable(self.handle)),
        }
    }

    /// Lock the slot, failing if the primitive was destroyed.
    fn live_slot(&self) -> Result<MutexGuard<'_, Slot>> {
        let slot = self.lock_slot()?;
        if slot.destroyed {
            return Err(Error::PrimitiveDestroyed(self.handle));
        }
        Ok(slot)
    }

    pub fn status(&self) -> PrimitiveStatus {
        match &self.body {
            Body::Spin(spin) => {
                let raw = spin.owner.load(Ordering::Acquire);
                PrimitiveStatus::Lock {
                    owner: (raw != 0).then(|| ThreadId::from_raw(raw)),
                    depth: u32::from(raw != 0),
                }
            }
            Body::Waitable(slot) => match &slot.lock().state {
                State::Lock { owner, depth, .. } => PrimitiveStatus::Lock {
                    owner: *owner,
                    depth: *depth,
                },
                State::Semaphore { max, current } => PrimitiveStatus::Semaphore {
                    max_count: *max,
                    current_count: *current,
                },
                State::Event { signaled, .. } => PrimitiveStatus::Event {
                    signaled: *signaled,
                },
                State::Timer {
                    signaled, timer_id, ..
                } => PrimitiveStatus::Timer {
                    signaled: *signaled,
                    timer_id: *timer_id,
                },
            },
        }
    }

    /// Number of live waiter back-references (includes not yet pruned ones).
    pub fn waiter_count(&self) -> usize {
        match &self.body {
            Body::Waitable(slot) => slot.lock().waiters.len(),
            Body::Spin(_) => 0,
        }
    }

    /// Release on behalf of `caller` and hand the primitive to waiters.
    ///
    /// Locks must be released by their owner; a semaphore at its maximum
    /// fails without changing its count; events become signaled. A released
    /// timer is cancelled: it stays signaled for every waiter until re-armed.
    pub(crate) fn release(&self, caller: ThreadId, registry: &WaitRegistry) -> Result<()> {
        if let Body::Spin(spin) = &self.body {
            return spin.release(caller);
        }

        let mut slot = self.live_slot()?;
        let available = match &mut slot.state {
            State::Lock { owner, depth, .. } => {
                if *owner != Some(caller) {
                    return Err(Error::NotOwner {
                        owner: *owner,
                        caller,
                    });
                }
                *depth -= 1;
                if *depth == 0 {
                    *owner = None;
                    true
                } else {
                    false
                }
            }
            State::Semaphore { max, current } => {
                if *current >= *max {
                    return Err(Error::SemaphoreOverflow { max_count: *max });
                }
                *current += 1;
                true
            }
            State::Event { signaled, .. } => {
                *signaled = true;
                true
            }
            State::Timer {
                signaled,
                cancelled,
                ..
            } => {
                *signaled = true;
                *cancelled = true;
                true
            }
        };

        if available {
            registry.notify_waiters(self.handle, &mut slot);
        }
        Ok(())
    }

    /// Non-blocking signal. Returns `false` when the state could not change
    /// (semaphore already at its maximum).
    pub(crate) fn try_signal(&self, registry: &WaitRegistry) -> Result<bool> {
        if self.kind.is_lock() {
            return Err(Error::SignalNotSupported(self.handle));
        }

        let mut slot = self.live_slot()?;
        match &mut slot.state {
            State::Semaphore { max, current } => {
                if *current >= *max {
                    return Ok(false);
                }
                *current += 1;
            }
            State::Event { signaled, .. } | State::Timer { signaled, .. } => *signaled = true,
            State::Lock { .. } => return Err(Error::SignalNotSupported(self.handle)),
        }
        registry.notify_waiters(self.handle, &mut slot);
        Ok(true)
    }

    /// Set an event, wake the waiters registered on it right now and clear
    /// it again.
    ///
    /// An auto-reset event wakes at most one waiter, a manual-reset event
    /// wakes all of them. Wait-all waiters see the event only if the rest of
    /// their set is available at that instant.
    pub(crate) fn pulse(&self, registry: &WaitRegistry) -> Result<()> {
        let mut slot = self.live_slot().map_err(|e| match e {
            Error::NotWaitable(h) => Error::SignalNotSupported(h),
            other => other,
        })?;
        match &mut slot.state {
            State::Event { signaled, .. } => *signaled = true,
            _ => return Err(Error::SignalNotSupported(self.handle)),
        }
        registry.notify_waiters(self.handle, &mut slot);
        if let State::Event { signaled, .. } = &mut slot.state {
            *signaled = false;
        }
        Ok(())
    }

    /// Clear a manual-reset event.
    pub(crate) fn reset(&self) -> Result<()> {
        let mut slot = self.live_slot().map_err(|e| match e {
            Error::NotWaitable(h) => Error::ResetNotSupported(h),
            other => other,
        })?;
        match &mut slot.state {
            State::Event {
                auto_reset: false,
                signaled,
            } => {
                *signaled = false;
                Ok(())
            }
            _ => Err(Error::ResetNotSupported(self.handle)),
        }
    }

    /// Clear an event or timer signal without waking anyone. A cancelled
    /// timer goes back to normal expiry behavior.
    pub(crate) fn clear_signal(&self) -> Result<()> {
        let mut slot = self.live_slot()?;
        match &mut slot.state {
            State::Event { signaled, .. } => {
                *signaled = false;
                Ok(())
            }
            State::Timer {
                signaled,
                cancelled,
                ..
            } => {
                *signaled = false;
                *cancelled = false;
                Ok(())
            }
            _ => Err(Error::SignalNotSupported(self.handle)),
        }
    }

    pub(crate) fn bind_timer(&self, id: TimerId) -> Result<()> {
        let mut slot = self.lock_slot()?;
        if let State::Timer { timer_id, .. } = &mut slot.state {
            *timer_id = id;
        }
        Ok(())
    }

    /// Timer bound to this primitive, if it is a timer.
    pub(crate) fn timer_id(&self) -> Option<TimerId> {
        match &self.body {
            Body::Waitable(slot) => match &slot.lock().state {
                State::Timer { timer_id, .. } => Some(*timer_id),
                _ => None,
            },
            Body::Spin(_) => None,
        }
    }

    /// Mark destroyed and force every registered waiter out.
    ///
    /// Returns the number of waiters that were still blocked on it.
    pub(crate) fn destroy(&self, registry: &WaitRegistry) -> usize {
        match &self.body {
            Body::Waitable(slot) => {
                let mut slot = slot.lock();
                slot.destroyed = true;
                registry.force_remove(self.handle, &mut slot)
            }
            Body::Spin(_) => 0,
        }
    }

    /// Busy-wait acquisition for spinlocks. Returns `false` on timeout.
    pub(crate) fn spin_acquire(
        &self,
        caller: ThreadId,
        deadline: Option<Instant>,
        spin_iterations: u32,
    ) -> Result<bool> {
        match &self.body {
            Body::Spin(spin) => spin.acquire(self.handle, caller, deadline, spin_iterations),
            Body::Waitable(_) => Err(Error::NotWaitable(self.handle)),
        }
    }
}

impl SpinLock {
    fn acquire(
        &self,
        handle: Handle,
        caller: ThreadId,
        deadline: Option<Instant>,
        spin_iterations: u32,
    ) -> Result<bool> {
        let me = caller.as_raw();
        if self.owner.load(Ordering::Relaxed) == me {
            return Err(Error::NonRecursiveReentry(handle));
        }

        let mut spins = 0u32;
        loop {
            if self
                .owner
                .compare_exchange(0, me, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(true);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(false);
            }
            if spins < spin_iterations {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    fn release(&self, caller: ThreadId) -> Result<()> {
        let me = caller.as_raw();
        self.owner
            .compare_exchange(me, 0, Ordering::Release, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|raw| Error::NotOwner {
                owner: (raw != 0).then(|| ThreadId::from_raw(raw)),
                caller,
            })
    }
}
