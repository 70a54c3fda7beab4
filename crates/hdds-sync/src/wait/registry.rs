// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Waiter registration and wake-up protocol.

use crate::core::{ThreadId, ThreadSignal, WakeBackend};
use crate::error::Result;
use crate::sync::{Handle, Primitive, Slot};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) type WaiterId = u64;

/// Back-reference from a primitive to a waiter interested in it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaiterRef {
    pub(crate) id: WaiterId,
    /// Position of the primitive in the waiter's set
    pub(crate) index: usize,
    pub(crate) thread: ThreadId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaiterStatus {
    /// Registered, nothing delivered yet.
    Waiting,
    /// Wait-any: primitive at this index was consumed on the waiter's behalf.
    Fired(usize),
    /// Wait-all: every primitive was observed available, waiter must verify.
    AllSatisfied,
    /// Wait-all: every primitive consumed.
    Acquired,
    /// A primitive in the set was destroyed under the waiter.
    Destroyed(Handle),
}

impl WaiterStatus {
    #[inline]
    fn is_open(self) -> bool {
        matches!(self, WaiterStatus::Waiting | WaiterStatus::AllSatisfied)
    }
}

struct WaiterEntry {
    signal: Arc<ThreadSignal>,
    wait_all: bool,
    status: WaiterStatus,
    /// Wait-all: primitives last observed available
    satisfied: Vec<bool>,
}

impl WaiterEntry {
    fn mark_satisfied(&mut self, index: usize) {
        self.satisfied[index] = true;
        if self.status == WaiterStatus::Waiting && self.satisfied.iter().all(|s| *s) {
            self.status = WaiterStatus::AllSatisfied;
            self.signal.notify();
        }
    }
}

/// Outcome of a wait-all acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllAttempt {
    Acquired,
    Pending,
}

/// Registry of blocked waiters and per-thread wake signals.
///
/// One coarse lock guards waiter entries; each primitive guards its own
/// waiter list. An entry is removed only by [`WaitRegistry::retire`], called
/// once by the waiting thread itself, so removal cannot happen twice.
pub struct WaitRegistry {
    backend: WakeBackend,
    next_waiter: AtomicU64,
    entries: Mutex<HashMap<WaiterId, WaiterEntry>>,
    signals: DashMap<ThreadId, Arc<ThreadSignal>>,
}

impl WaitRegistry {
    pub fn new(backend: WakeBackend) -> Self {
        Self {
            backend,
            next_waiter: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
            signals: DashMap::new(),
        }
    }

    /// Wake signal of `thread`, created on first use.
    pub fn signal_for(&self, thread: ThreadId) -> Result<Arc<ThreadSignal>> {
        if let Some(signal) = self.signals.get(&thread) {
            return Ok(Arc::clone(signal.value()));
        }
        let signal = Arc::new(ThreadSignal::new(thread, self.backend)?);
        Ok(Arc::clone(self.signals.entry(thread).or_insert(signal).value()))
    }

    /// Wake signal for a thread about to block. A signal left behind by an
    /// exited thread whose id was reused is replaced, dropping its alert.
    pub(crate) fn signal_for_waiter(&self, thread: ThreadId) -> Result<Arc<ThreadSignal>> {
        let signal = self.signal_for(thread)?;
        if signal.claim() {
            return Ok(signal);
        }
        log::debug!("[wait] {} reused by a new thread, replacing stale signal", thread);
        let fresh = Arc::new(ThreadSignal::new(thread, self.backend)?);
        fresh.claim();
        self.signals.insert(thread, Arc::clone(&fresh));
        Ok(fresh)
    }

    /// Raise the alert of `thread`, interrupting its alertable wait.
    pub fn interrupt(&self, thread: ThreadId) -> Result<()> {
        self.signal_for(thread)?.alert();
        log::debug!("[wait] alert raised for {}", thread);
        Ok(())
    }

    /// Drop the wake signal of a thread that will not wait again, along
    /// with any alert still pending on it.
    pub fn forget_thread(&self, thread: ThreadId) {
        if let Some((_, signal)) = self.signals.remove(&thread) {
            signal.take_alert();
        }
    }

    /// Number of registered (not yet retired) waiters.
    pub fn waiter_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn register(
        &self,
        signal: Arc<ThreadSignal>,
        len: usize,
        wait_all: bool,
    ) -> WaiterId {
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(
            id,
            WaiterEntry {
                signal,
                wait_all,
                status: WaiterStatus::Waiting,
                satisfied: vec![false; len],
            },
        );
        id
    }

    pub(crate) fn status(&self, id: WaiterId) -> Option<WaiterStatus> {
        self.entries.lock().get(&id).map(|entry| entry.status)
    }

    /// Register waiter `id` on one primitive, taking it immediately when a
    /// wait-any finds it available.
    ///
    /// Returns `false` once the entry is no longer waiting and the remaining
    /// primitives need not be attached.
    pub(crate) fn attach(
        &self,
        id: WaiterId,
        index: usize,
        caller: ThreadId,
        primitive: &Primitive,
    ) -> bool {
        let Ok(mut slot) = primitive.lock_slot() else {
            return true;
        };
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };
        if entry.status != WaiterStatus::Waiting {
            return false;
        }
        if slot.destroyed {
            entry.status = WaiterStatus::Destroyed(primitive.handle());
            return false;
        }

        let available = slot.state.is_consumable_for(caller);
        if entry.wait_all {
            if available {
                entry.satisfied[index] = true;
                if entry.satisfied.iter().all(|s| *s) {
                    entry.status = WaiterStatus::AllSatisfied;
                }
            }
        } else if available {
            slot.state.consume(caller);
            entry.status = WaiterStatus::Fired(index);
            return false;
        }

        slot.waiters.push(WaiterRef {
            id,
            index,
            thread: caller,
        });
        true
    }

    /// Hand a newly available primitive to its waiters.
    ///
    /// Called with the primitive's slot locked. Wait-any waiters consume it
    /// and are woken; wait-all waiters are marked and woken only once their
    /// whole set is satisfied. Stops as soon as the primitive is no longer
    /// available, so an auto-reset primitive wakes one waiter, a semaphore
    /// wakes up to its count and a manual-reset event wakes every waiter.
    /// Back-references of retired or already-served waiters are pruned.
    pub(crate) fn notify_waiters(&self, handle: Handle, slot: &mut Slot) {
        if slot.waiters.is_empty() {
            return;
        }
        let mut entries = self.entries.lock();
        let mut woken = 0usize;
        let mut i = 0;
        while i < slot.waiters.len() {
            let waiter = slot.waiters[i];
            if !slot.state.is_consumable_for(waiter.thread) {
                break;
            }
            let Some(entry) = entries.get_mut(&waiter.id) else {
                slot.waiters.remove(i);
                continue;
            };
            if !entry.status.is_open() {
                slot.waiters.remove(i);
                continue;
            }

            if entry.wait_all {
                entry.mark_satisfied(waiter.index);
                i += 1;
            } else {
                slot.state.consume(waiter.thread);
                entry.status = WaiterStatus::Fired(waiter.index);
                entry.signal.notify();
                slot.waiters.remove(i);
                woken += 1;
            }
        }
        if woken > 0 {
            log::trace!("[wait] {} woke {} waiter(s)", handle, woken);
        }
    }

    /// Force every waiter out of a destroyed primitive.
    pub(crate) fn force_remove(&self, handle: Handle, slot: &mut Slot) -> usize {
        let mut entries = self.entries.lock();
        let mut forced = 0usize;
        for waiter in slot.waiters.drain(..) {
            if let Some(entry) = entries.get_mut(&waiter.id) {
                if entry.status.is_open() {
                    entry.status = WaiterStatus::Destroyed(handle);
                    entry.signal.notify();
                    forced += 1;
                }
            }
        }
        if forced > 0 {
            log::warn!(
                "[wait] {} destroyed with {} waiter(s) still registered, forcing them out",
                handle,
                forced
            );
        }
        forced
    }

    /// Wait-all: lock the whole set in handle order and take every primitive
    /// if all are available; otherwise record which ones are missing.
    pub(crate) fn try_acquire_all(
        &self,
        id: WaiterId,
        caller: ThreadId,
        primitives: &[Arc<Primitive>],
    ) -> AllAttempt {
        let mut order: Vec<usize> = (0..primitives.len()).collect();
        order.sort_by_key(|&i| primitives[i].handle());

        let mut guards: Vec<(usize, MutexGuard<'_, Slot>)> = Vec::with_capacity(order.len());
        for i in order {
            match primitives[i].lock_slot() {
                Ok(guard) => guards.push((i, guard)),
                Err(_) => return AllAttempt::Pending,
            }
        }

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return AllAttempt::Pending;
        };
        if entry.status != WaiterStatus::AllSatisfied {
            return AllAttempt::Pending;
        }
        if let Some((i, _)) = guards.iter().find(|(_, slot)| slot.destroyed) {
            entry.status = WaiterStatus::Destroyed(primitives[*i].handle());
            return AllAttempt::Pending;
        }

        let mut all = true;
        for (i, slot) in &guards {
            let available = slot.state.is_consumable_for(caller);
            entry.satisfied[*i] = available;
            all &= available;
        }
        if !all {
            entry.status = WaiterStatus::Waiting;
            return AllAttempt::Pending;
        }

        for (_, slot) in guards.iter_mut() {
            slot.state.consume(caller);
        }
        entry.status = WaiterStatus::Acquired;
        AllAttempt::Acquired
    }

    /// Remove waiter `id` and detach it from every primitive in its set.
    ///
    /// Returns the entry's final status; a `Fired` status means the
    /// primitive was already consumed for the caller and must be honored.
    /// Detaching is idempotent.
    pub(crate) fn retire(
        &self,
        id: WaiterId,
        primitives: &[Arc<Primitive>],
    ) -> Option<WaiterStatus> {
        let status = self.entries.lock().remove(&id).map(|entry| entry.status);
        for primitive in primitives {
            if let Ok(mut slot) = primitive.lock_slot() {
                slot.waiters.retain(|waiter| waiter.id != id);
            }
        }
        status
    }
}

impl std::fmt::Debug for WaitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitRegistry")
            .field("backend", &self.backend)
            .field("waiters", &self.waiter_count())
            .field("threads", &self.signals.len())
            .finish()
    }
}
