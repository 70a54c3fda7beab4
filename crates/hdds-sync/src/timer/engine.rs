// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timer engine.

use super::queue::ExpiredQueue;
use super::record::{ExpiredTimerEntry, TimerRecord, TimerState};
use super::source::{FireCallback, SourceId, TimerSource};
use super::TimerId;
use crate::core::{ThreadId, Timestamp};
use crate::error::{Error, Result};
use crate::sync::{Handle, InitialState, PrimitiveKind, PrimitiveTable};
use crate::wait::WaitRegistry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Where expirations of a timer go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Owner's expired queue, with its ready event signaled.
    Queue,
    /// Signal a timer primitive directly.
    Primitive(Handle),
}

struct TimerSlot {
    record: TimerRecord,
    delivery: Delivery,
    source: SourceId,
    /// Token of the current arming; fires carrying another token are stale
    arm_seq: u64,
}

struct EngineShared {
    source: Arc<dyn TimerSource>,
    table: Arc<PrimitiveTable>,
    registry: Arc<WaitRegistry>,
    next_id: AtomicU64,
    timers: DashMap<TimerId, Arc<Mutex<TimerSlot>>>,
    queues: DashMap<ThreadId, Arc<ExpiredQueue>>,
    warn_len: usize,
}

/// Owns every timer and delivers expirations to owner threads.
///
/// # Concurrency
/// Each timer's record has its own lock, held across the whole fire path
/// (token check, bookkeeping, enqueue, signal) and across stop. A stop that
/// returns has therefore either seen the fire's entry (and purged it) or made
/// the fire stale.
pub struct TimerEngine {
    shared: Arc<EngineShared>,
}

impl TimerEngine {
    pub fn new(
        source: Arc<dyn TimerSource>,
        table: Arc<PrimitiveTable>,
        registry: Arc<WaitRegistry>,
        expired_queue_warn_len: usize,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                source,
                table,
                registry,
                next_id: AtomicU64::new(1),
                timers: DashMap::new(),
                queues: DashMap::new(),
                warn_len: expired_queue_warn_len,
            }),
        }
    }

    /// Arm a timer whose expirations go to `owner`'s expired queue.
    ///
    /// A zero period is a benign no-op returning [`TimerId::INVALID`]. If the
    /// timer source fails nothing stays registered.
    pub fn arm_timer(&self, owner: ThreadId, period_ms: u32, periodic: bool) -> Result<TimerId> {
        if period_ms == 0 {
            log::debug!("[timer] arm with zero period for {} ignored", owner);
            return Ok(TimerId::INVALID);
        }
        // Queue exists before the first fire can look for it.
        self.shared.queue_for(owner)?;
        let id = self.create_timer(owner, Delivery::Queue)?;
        if let Err(e) = self.restart_timer(id, period_ms, periodic) {
            let _ = self.cancel_timer(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Register an idle timer and its source.
    pub fn create_timer(&self, owner: ThreadId, delivery: Delivery) -> Result<TimerId> {
        let shared = &self.shared;
        let id = TimerId::from_raw(shared.next_id.fetch_add(1, Ordering::Relaxed));

        let weak: Weak<EngineShared> = Arc::downgrade(shared);
        let callback: FireCallback = Arc::new(move |token| {
            if let Some(shared) = weak.upgrade() {
                shared.on_fire(id, token);
            }
        });
        let source = shared.source.create(callback).map_err(|e| {
            log::error!("[timer] source creation for {} failed: {}", id, e);
            e
        })?;

        shared.timers.insert(
            id,
            Arc::new(Mutex::new(TimerSlot {
                record: TimerRecord::new(id, owner),
                delivery,
                source,
                arm_seq: 0,
            })),
        );
        Ok(id)
    }

    /// Re-arm an existing timer (Idle/Expired/Pending -> Pending) with a new
    /// period. A zero period stops it instead.
    pub fn restart_timer(&self, id: TimerId, period_ms: u32, periodic: bool) -> Result<()> {
        if period_ms == 0 {
            return self.stop_timer(id);
        }
        let slot = self.shared.slot(id)?;
        let mut slot = slot.lock();
        slot.arm_seq += 1;
        let token = slot.arm_seq;
        let period = Duration::from_millis(u64::from(period_ms));
        if let Err(e) = self.shared.source.arm(slot.source, period, periodic, token) {
            log::error!("[timer] arming {} failed: {}", id, e);
            slot.record.stop();
            return Err(e);
        }
        slot.record.arm(period_ms, periodic, Timestamp::now());
        log::trace!(
            "[timer] {} armed: {}ms periodic={} owner={}",
            id,
            period_ms,
            periodic,
            slot.record.owner
        );
        Ok(())
    }

    /// Disarm, go Idle and drop undelivered expirations of this timer.
    pub fn stop_timer(&self, id: TimerId) -> Result<()> {
        let slot = self.shared.slot(id)?;
        let mut slot = slot.lock();
        self.shared.stop_locked(&mut slot);
        Ok(())
    }

    /// Stop, release the source and forget the timer.
    pub fn cancel_timer(&self, id: TimerId) -> Result<()> {
        let (_, slot) = self
            .shared
            .timers
            .remove(&id)
            .ok_or(Error::UnknownTimer(id))?;
        let mut slot = slot.lock();
        self.shared.stop_locked(&mut slot);
        if let Err(e) = self.shared.source.delete(slot.source) {
            log::debug!("[timer] deleting source of {} failed: {}", id, e);
        }
        Ok(())
    }

    /// True while a timer is pending, or expired with expirations its owner
    /// has not drained yet.
    pub fn is_timer_active(&self, id: TimerId) -> bool {
        let Ok(slot) = self.shared.slot(id) else {
            return false;
        };
        let slot = slot.lock();
        match slot.record.state {
            TimerState::Pending => true,
            TimerState::Idle => false,
            TimerState::Expired => match slot.delivery {
                Delivery::Queue => self
                    .shared
                    .queue(slot.record.owner)
                    .is_some_and(|queue| queue.count_for(id) > 0),
                Delivery::Primitive(_) => false,
            },
        }
    }

    /// Pop every expiration of `owner` in fire order. Owner thread only.
    pub fn drain_expired(&self, owner: ThreadId) -> Result<Vec<ExpiredTimerEntry>> {
        let caller = ThreadId::current();
        if caller != owner {
            return Err(Error::WrongThread {
                expected: owner,
                caller,
            });
        }
        Ok(self
            .shared
            .queue(owner)
            .map(|queue| queue.drain())
            .unwrap_or_default())
    }

    /// Handle of `owner`'s "expired queue has data" event.
    pub fn expired_signal(&self, owner: ThreadId) -> Result<Handle> {
        Ok(self.shared.queue_for(owner)?.ready_handle())
    }

    /// Delivery target of a timer.
    pub fn delivery(&self, id: TimerId) -> Result<Delivery> {
        Ok(self.shared.slot(id)?.lock().delivery)
    }

    pub fn timer_state(&self, id: TimerId) -> Option<TimerState> {
        self.shared
            .slot(id)
            .ok()
            .map(|slot| slot.lock().record.state)
    }

    pub fn timer_record(&self, id: TimerId) -> Option<TimerRecord> {
        self.shared
            .slot(id)
            .ok()
            .map(|slot| slot.lock().record.clone())
    }

    /// Undelivered expirations queued for `owner`.
    pub fn pending_expired(&self, owner: ThreadId) -> usize {
        self.shared.queue(owner).map_or(0, |queue| queue.len())
    }

    pub fn timer_count(&self) -> usize {
        self.shared.timers.len()
    }

    /// Cancel every timer. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<TimerId> = self.shared.timers.iter().map(|e| *e.key()).collect();
        ids.into_iter()
            .filter(|id| self.cancel_timer(*id).is_ok())
            .count()
    }

    /// Drop the expired queue of an owner that will not drain again.
    /// Returns the handle of its ready event for the caller to destroy.
    pub fn release_owner(&self, owner: ThreadId) -> Option<Handle> {
        self.shared
            .queues
            .remove(&owner)
            .map(|(_, queue)| queue.ready_handle())
    }
}

impl EngineShared {
    fn slot(&self, id: TimerId) -> Result<Arc<Mutex<TimerSlot>>> {
        self.timers
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::UnknownTimer(id))
    }

    fn queue_for(&self, owner: ThreadId) -> Result<Arc<ExpiredQueue>> {
        if let Some(queue) = self.queues.get(&owner) {
            return Ok(Arc::clone(queue.value()));
        }
        match self.queues.entry(owner) {
            Entry::Occupied(queue) => Ok(Arc::clone(queue.get())),
            Entry::Vacant(vacant) => {
                let ready = self.table.insert(
                    PrimitiveKind::Event { auto_reset: true },
                    InitialState::Unsignaled,
                    owner,
                )?;
                let queue = Arc::new(ExpiredQueue::new(owner, ready, self.warn_len));
                log::debug!(
                    "[timer] expired queue for {} created (ready={})",
                    queue.owner(),
                    queue.ready_handle()
                );
                vacant.insert(Arc::clone(&queue));
                Ok(queue)
            }
        }
    }

    fn queue(&self, owner: ThreadId) -> Option<Arc<ExpiredQueue>> {
        self.queues.get(&owner).map(|queue| Arc::clone(queue.value()))
    }

    fn stop_locked(&self, slot: &mut TimerSlot) {
        slot.arm_seq += 1;
        slot.record.stop();
        if let Err(e) = self.source.disarm(slot.source) {
            log::debug!("[timer] disarm of {} failed: {}", slot.record.timer_id, e);
        }
        if slot.delivery == Delivery::Queue {
            if let Some(queue) = self.queue(slot.record.owner) {
                let purged = queue.purge(slot.record.timer_id);
                if purged > 0 {
                    log::trace!(
                        "[timer] {} stopped, {} undelivered expirations dropped",
                        slot.record.timer_id,
                        purged
                    );
                }
            }
        }
    }

    /// Fire callback. Runs on the timer source's thread.
    fn on_fire(&self, id: TimerId, token: u64) {
        let Ok(slot) = self.slot(id) else {
            log::debug!("[timer] fire for unknown {} dropped", id);
            return;
        };
        let mut slot = slot.lock();
        if slot.arm_seq != token || slot.record.state != TimerState::Pending {
            log::debug!(
                "[timer] stale fire for {} dropped (token {} vs {}, {:?})",
                id,
                token,
                slot.arm_seq,
                slot.record.state
            );
            return;
        }

        let entry = slot.record.fire(Timestamp::now());
        match slot.delivery {
            Delivery::Queue => match self.queue(slot.record.owner) {
                Some(queue) => queue.push(entry, &self.registry),
                None => log::debug!(
                    "[timer] no expired queue for {}, {} expiration dropped",
                    slot.record.owner,
                    id
                ),
            },
            Delivery::Primitive(handle) => {
                let signaled = self
                    .table
                    .get(handle)
                    .and_then(|primitive| primitive.try_signal(&self.registry));
                if let Err(e) = signaled {
                    log::debug!("[timer] signaling {} for {} failed: {}", handle, id, e);
                }
            }
        }
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("timers", &self.shared.timers.len())
            .field("owners", &self.shared.queues.len())
            .finish()
    }
}
