// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide synchronization context.
//!
//! [`SyncContext`] owns the primitive table, the wait registry (with the
//! per-thread wake signals) and the timer engine. Build one at startup, share
//! it by reference or `Arc`, and tear it down with [`SyncContext::shutdown`]
//! (or by dropping it).

use crate::config::SyncConfig;
use crate::core::{deadline_after, ThreadId};
use crate::error::{Error, Result};
use crate::sync::{Handle, InitialState, Primitive, PrimitiveKind, PrimitiveStatus, PrimitiveTable};
use crate::timer::{
    Delivery, ExpiredTimerEntry, ThreadTimerSource, TimerEngine, TimerId, TimerRecord,
    TimerSource, TimerState,
};
use crate::wait::{self, validate_wait_set, AcquireResult, WaitRegistry, WaitResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Entry point to primitives, multi-object waits and timers.
pub struct SyncContext {
    config: SyncConfig,
    table: Arc<PrimitiveTable>,
    registry: Arc<WaitRegistry>,
    engine: TimerEngine,
    /// Set when the context spawned its own timer thread
    service: Option<Arc<ThreadTimerSource>>,
    shut_down: AtomicBool,
}

impl SyncContext {
    /// Validate `config` and start the timer service thread.
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let service = Arc::new(ThreadTimerSource::spawn(&config.timer_thread_name)?);
        let source: Arc<dyn TimerSource> = Arc::clone(&service) as Arc<dyn TimerSource>;
        let mut ctx = Self::build(config, source);
        ctx.service = Some(service);
        Ok(ctx)
    }

    /// Build on a caller-supplied timer source.
    pub fn with_timer_source(config: SyncConfig, source: Arc<dyn TimerSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, source))
    }

    fn build(config: SyncConfig, source: Arc<dyn TimerSource>) -> Self {
        let table = Arc::new(PrimitiveTable::new());
        let registry = Arc::new(WaitRegistry::new(config.wake_backend));
        let engine = TimerEngine::new(
            source,
            Arc::clone(&table),
            Arc::clone(&registry),
            config.expired_queue_warn_len,
        );
        log::debug!(
            "[sync] context up: max_wait_objects={} wake={:?}",
            config.max_wait_objects,
            config.wake_backend
        );
        Self {
            config,
            table,
            registry,
            engine,
            service: None,
            shut_down: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ===================================================================
    // Primitives
    // ===================================================================

    /// Create a primitive owned by the calling thread where ownership applies.
    ///
    /// A timer created `Unsignaled` is armed immediately with its own period.
    pub fn create_primitive(&self, kind: PrimitiveKind, initial: InitialState) -> Result<Handle> {
        let creator = ThreadId::current();
        let primitive = self.table.insert(kind, initial, creator)?;
        let handle = primitive.handle();

        if let PrimitiveKind::Timer {
            periodic,
            period_ms,
            ..
        } = kind
        {
            if let Err(e) = self.bind_timer(&primitive, creator, initial, periodic, period_ms) {
                let _ = self.table.remove(handle);
                return Err(e);
            }
        }
        Ok(handle)
    }

    fn bind_timer(
        &self,
        primitive: &Primitive,
        owner: ThreadId,
        initial: InitialState,
        periodic: bool,
        period_ms: u32,
    ) -> Result<()> {
        let id = self
            .engine
            .create_timer(owner, Delivery::Primitive(primitive.handle()))?;
        primitive.bind_timer(id)?;
        if initial == InitialState::Unsignaled && period_ms > 0 {
            if let Err(e) = self.engine.restart_timer(id, period_ms, periodic) {
                let _ = self.engine.cancel_timer(id);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Destroy a primitive. Threads still waiting on it are forced out with
    /// [`Error::PrimitiveDestroyed`].
    pub fn destroy_primitive(&self, handle: Handle) -> Result<()> {
        let primitive = self.table.remove(handle)?;
        if let Some(id) = primitive.timer_id() {
            if id.is_valid() {
                let _ = self.engine.cancel_timer(id);
            }
        }
        primitive.destroy(&self.registry);
        log::debug!("[sync] destroyed {}", handle);
        Ok(())
    }

    /// Acquire one primitive, blocking up to `timeout_ms`
    /// ([`WAIT_INFINITE`](crate::config::WAIT_INFINITE) for no limit, 0 to poll).
    pub fn acquire(&self, handle: Handle, timeout_ms: u32) -> Result<AcquireResult> {
        let primitive = self.table.get(handle)?;
        let deadline = deadline_after(timeout_ms);

        if !primitive.kind().is_waitable() {
            let acquired = primitive.spin_acquire(
                ThreadId::current(),
                deadline,
                self.config.spin_iterations,
            )?;
            return Ok(if acquired {
                AcquireResult::Acquired
            } else {
                AcquireResult::TimedOut
            });
        }

        match wait::wait_multiple(&self.registry, &[primitive], false, deadline, false)? {
            WaitResult::Index(_) | WaitResult::AllSignaled => Ok(AcquireResult::Acquired),
            WaitResult::TimedOut | WaitResult::Interrupted => Ok(AcquireResult::TimedOut),
        }
    }

    /// Release a lock or semaphore, or set an event.
    ///
    /// Releasing a timer cancels its schedule and leaves it signaled, which
    /// lets every blocked waiter through.
    pub fn release(&self, handle: Handle) -> Result<()> {
        let primitive = self.table.get(handle)?;
        if let Some(id) = primitive.timer_id() {
            if id.is_valid() {
                self.engine.stop_timer(id)?;
            }
        }
        primitive.release(ThreadId::current(), &self.registry)
    }

    /// Wake the waiters currently blocked on an event and leave it
    /// unsignaled.
    pub fn pulse(&self, handle: Handle) -> Result<()> {
        self.table.get(handle)?.pulse(&self.registry)
    }

    /// Clear a manual-reset event.
    pub fn reset(&self, handle: Handle) -> Result<()> {
        self.table.get(handle)?.reset()
    }

    /// Non-blocking signal of an event, timer or semaphore.
    ///
    /// Returns `false` if a semaphore is already at its maximum.
    pub fn try_signal(&self, handle: Handle) -> Result<bool> {
        self.table.get(handle)?.try_signal(&self.registry)
    }

    /// Clear a timer primitive and arm it again with its period.
    pub fn set_timer(&self, handle: Handle) -> Result<()> {
        let primitive = self.table.get(handle)?;
        let PrimitiveKind::Timer {
            periodic,
            period_ms,
            ..
        } = primitive.kind()
        else {
            return Err(Error::SignalNotSupported(handle));
        };
        let id = primitive
            .timer_id()
            .filter(|id| id.is_valid())
            .ok_or(Error::SignalNotSupported(handle))?;
        primitive.clear_signal()?;
        self.engine.restart_timer(id, period_ms, periodic)
    }

    pub fn primitive_status(&self, handle: Handle) -> Result<PrimitiveStatus> {
        Ok(self.table.get(handle)?.status())
    }

    /// Threads currently registered on one primitive.
    pub fn waiters_on(&self, handle: Handle) -> Result<usize> {
        Ok(self.table.get(handle)?.waiter_count())
    }

    pub fn primitive_count(&self) -> usize {
        self.table.len()
    }

    // ===================================================================
    // Multi-object wait
    // ===================================================================

    /// Block until one (`wait_all == false`) or all of `handles` signal.
    ///
    /// Fails before registering anything if the set is empty, larger than
    /// the configured maximum, has duplicates, unknown handles or spinlocks.
    pub fn wait_multiple(
        &self,
        handles: &[Handle],
        wait_all: bool,
        timeout_ms: u32,
        alertable: bool,
    ) -> Result<WaitResult> {
        validate_wait_set(handles, self.config.max_wait_objects)?;
        let primitives = handles
            .iter()
            .map(|handle| {
                let primitive = self.table.get(*handle)?;
                if !primitive.kind().is_waitable() {
                    return Err(Error::NotWaitable(*handle));
                }
                Ok(primitive)
            })
            .collect::<Result<Vec<_>>>()?;

        wait::wait_multiple(
            &self.registry,
            &primitives,
            wait_all,
            deadline_after(timeout_ms),
            alertable,
        )
    }

    /// Interrupt the alertable wait of `thread` (or its next one).
    pub fn interrupt(&self, thread: ThreadId) -> Result<()> {
        self.registry.interrupt(thread)
    }

    /// Waiters currently registered across all primitives.
    pub fn waiter_count(&self) -> usize {
        self.registry.waiter_count()
    }

    // ===================================================================
    // Timers
    // ===================================================================

    /// Arm a timer delivering into `owner`'s expired queue.
    pub fn arm_timer(&self, owner: ThreadId, period_ms: u32, periodic: bool) -> Result<TimerId> {
        self.engine.arm_timer(owner, period_ms, periodic)
    }

    /// Re-arm a timer. For a timer primitive this also clears its signal.
    pub fn restart_timer(&self, id: TimerId, period_ms: u32, periodic: bool) -> Result<()> {
        if let Delivery::Primitive(handle) = self.engine.delivery(id)? {
            if period_ms == 0 {
                return self.release(handle);
            }
            self.table.get(handle)?.clear_signal()?;
        }
        self.engine.restart_timer(id, period_ms, periodic)
    }

    /// Stop a timer. Stopping a timer primitive's timer releases the
    /// primitive, so its waiters are let through.
    pub fn stop_timer(&self, id: TimerId) -> Result<()> {
        match self.engine.delivery(id)? {
            Delivery::Queue => self.engine.stop_timer(id),
            Delivery::Primitive(handle) => self.release(handle),
        }
    }

    /// Stop and forget a timer. A timer primitive's timer is rejected: it
    /// goes away with [`destroy_primitive`](Self::destroy_primitive).
    pub fn cancel_timer(&self, id: TimerId) -> Result<()> {
        match self.engine.delivery(id)? {
            Delivery::Queue => self.engine.cancel_timer(id),
            Delivery::Primitive(handle) => Err(Error::TimerBoundToPrimitive { timer: id, handle }),
        }
    }

    pub fn is_timer_active(&self, id: TimerId) -> bool {
        self.engine.is_timer_active(id)
    }

    /// Pop `owner`'s expirations in fire order. Must run on `owner`.
    pub fn drain_expired(&self, owner: ThreadId) -> Result<Vec<ExpiredTimerEntry>> {
        self.engine.drain_expired(owner)
    }

    /// Event handle to include in `owner`'s wait set.
    pub fn expired_signal(&self, owner: ThreadId) -> Result<Handle> {
        self.engine.expired_signal(owner)
    }

    pub fn timer_state(&self, id: TimerId) -> Option<TimerState> {
        self.engine.timer_state(id)
    }

    pub fn timer_record(&self, id: TimerId) -> Option<TimerRecord> {
        self.engine.timer_record(id)
    }

    pub fn pending_expired(&self, owner: ThreadId) -> usize {
        self.engine.pending_expired(owner)
    }

    pub fn timer_count(&self) -> usize {
        self.engine.timer_count()
    }

    /// Forget a dispatcher thread: its expired queue, ready event and wake
    /// signal (with any pending alert) are released.
    ///
    /// Dispatcher threads call this before they exit. Otherwise the wake
    /// signal (an eventfd on that backend) stays allocated until a new
    /// thread with the same id first waits and replaces it.
    pub fn release_thread(&self, thread: ThreadId) {
        if let Some(ready) = self.engine.release_owner(thread) {
            let _ = self.destroy_primitive(ready);
        }
        self.registry.forget_thread(thread);
    }

    // ===================================================================
    // Teardown
    // ===================================================================

    /// Cancel every timer and stop the timer thread. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancelled = self.engine.cancel_all();
        if let Some(service) = &self.service {
            service.shutdown();
        }
        log::debug!(
            "[sync] context down: {} timers cancelled, {} primitives left",
            cancelled,
            self.table.len()
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for SyncContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("primitives", &self.table.len())
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
