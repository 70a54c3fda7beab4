// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::core::{ThreadId, WakeBackend};
use crate::error::{Error, Result};
use crate::sync::{InitialState, PrimitiveKind, PrimitiveStatus, PrimitiveTable};
use crate::wait::{wait_multiple, WaitRegistry, WaitResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Timer source fired by hand from the test thread.
#[derive(Default)]
struct ManualSource {
    next: AtomicU64,
    slots: Mutex<HashMap<SourceId, (FireCallback, Option<u64>)>>,
    fail_create: AtomicBool,
    fail_arm: AtomicBool,
}

impl ManualSource {
    /// Armed sources with their current token.
    fn armed(&self) -> Vec<(FireCallback, u64)> {
        self.slots
            .lock()
            .values()
            .filter_map(|(cb, token)| token.map(|t| (Arc::clone(cb), t)))
            .collect()
    }

    fn fire_all(&self) -> usize {
        let armed = self.armed();
        for (callback, token) in &armed {
            callback(*token);
        }
        armed.len()
    }
}

impl TimerSource for ManualSource {
    fn create(&self, callback: FireCallback) -> Result<SourceId> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::TimerSourceFailed("create refused".into()));
        }
        let id = SourceId::from_raw(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.slots.lock().insert(id, (callback, None));
        Ok(id)
    }

    fn arm(&self, id: SourceId, _period: Duration, _periodic: bool, token: u64) -> Result<()> {
        if self.fail_arm.load(Ordering::SeqCst) {
            return Err(Error::TimerSourceFailed("arm refused".into()));
        }
        if let Some(slot) = self.slots.lock().get_mut(&id) {
            slot.1 = Some(token);
        }
        Ok(())
    }

    fn disarm(&self, id: SourceId) -> Result<()> {
        if let Some(slot) = self.slots.lock().get_mut(&id) {
            slot.1 = None;
        }
        Ok(())
    }

    fn delete(&self, id: SourceId) -> Result<()> {
        self.slots.lock().remove(&id);
        Ok(())
    }
}

struct Fixture {
    source: Arc<ManualSource>,
    table: Arc<PrimitiveTable>,
    registry: Arc<WaitRegistry>,
    engine: TimerEngine,
}

fn fixture() -> Fixture {
    let source = Arc::new(ManualSource::default());
    let table = Arc::new(PrimitiveTable::new());
    let registry = Arc::new(WaitRegistry::new(WakeBackend::Condvar));
    let engine = TimerEngine::new(
        Arc::clone(&source) as Arc<dyn TimerSource>,
        Arc::clone(&table),
        Arc::clone(&registry),
        4,
    );
    Fixture {
        source,
        table,
        registry,
        engine,
    }
}

#[test]
fn test_zero_period_is_noop() {
    let fx = fixture();
    let id = fx
        .engine
        .arm_timer(ThreadId::current(), 0, true)
        .expect("arm");
    assert_eq!(id, TimerId::INVALID);
    assert_eq!(fx.engine.timer_count(), 0);
    assert!(!fx.engine.is_timer_active(id));
}

#[test]
fn test_one_shot_lifecycle() {
    let fx = fixture();
    let me = ThreadId::current();
    let id = fx.engine.arm_timer(me, 50, false).expect("arm");

    let record = fx.engine.timer_record(id).expect("record");
    assert_eq!(record.state, TimerState::Pending);
    assert_eq!(record.owner, me);
    assert_eq!(record.period_ms, 50);
    assert!(record.started_at.as_nanos() > 0);
    assert!(fx.engine.is_timer_active(id));

    assert_eq!(fx.source.fire_all(), 1);
    let record = fx.engine.timer_record(id).expect("record");
    assert_eq!(record.state, TimerState::Expired);
    assert_eq!(record.fire_count, 1);
    assert!(fx.engine.is_timer_active(id), "undelivered expiration");

    let drained = fx.engine.drain_expired(me).expect("drain");
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].timer_id, id);
    assert_eq!(drained[0].fire_count, 1);
    assert_eq!(drained[0].expired_at(), record.last_expired_at);
    assert!(!fx.engine.is_timer_active(id));
}

#[test]
fn test_periodic_rearms_before_delivery() {
    let fx = fixture();
    let me = ThreadId::current();
    let id = fx.engine.arm_timer(me, 10, true).expect("arm");

    fx.source.fire_all();
    assert_eq!(fx.engine.timer_state(id), Some(TimerState::Pending));
    fx.source.fire_all();
    fx.source.fire_all();

    let counts: Vec<u64> = fx
        .engine
        .drain_expired(me)
        .expect("drain")
        .iter()
        .map(|e| e.fire_count)
        .collect();
    assert_eq!(counts, vec![1, 2, 3]);
}

#[test]
fn test_stop_purges_and_rejects_late_fire() {
    let fx = fixture();
    let me = ThreadId::current();
    let id = fx.engine.arm_timer(me, 10, true).expect("arm");
    fx.source.fire_all();
    assert_eq!(fx.engine.pending_expired(me), 1);

    // Callback already in flight when stop runs.
    let in_flight = fx.source.armed();
    fx.engine.stop_timer(id).expect("stop");
    assert_eq!(fx.engine.pending_expired(me), 0);
    assert_eq!(fx.engine.timer_state(id), Some(TimerState::Idle));

    for (callback, token) in in_flight {
        callback(token);
    }
    assert!(fx.engine.drain_expired(me).expect("drain").is_empty());
    assert_eq!(fx.engine.timer_record(id).map(|r| r.fire_count), Some(1));
}

#[test]
fn test_cancel_removes_record() {
    let fx = fixture();
    let me = ThreadId::current();
    let id = fx.engine.arm_timer(me, 10, false).expect("arm");
    let in_flight = fx.source.armed();

    fx.engine.cancel_timer(id).expect("cancel");
    assert_eq!(fx.engine.timer_count(), 0);
    assert!(fx.engine.timer_record(id).is_none());
    assert!(matches!(
        fx.engine.cancel_timer(id),
        Err(Error::UnknownTimer(t)) if t == id
    ));

    for (callback, token) in in_flight {
        callback(token);
    }
    assert_eq!(fx.engine.pending_expired(me), 0);
}

#[test]
fn test_ids_not_reused() {
    let fx = fixture();
    let me = ThreadId::current();
    let first = fx.engine.arm_timer(me, 10, false).expect("arm");
    fx.engine.cancel_timer(first).expect("cancel");
    let second = fx.engine.arm_timer(me, 10, false).expect("arm");
    assert_ne!(first, second);
}

#[test]
fn test_source_failure_leaves_nothing() {
    let fx = fixture();
    let me = ThreadId::current();

    fx.source.fail_create.store(true, Ordering::SeqCst);
    assert!(matches!(
        fx.engine.arm_timer(me, 10, false),
        Err(Error::TimerSourceFailed(_))
    ));
    assert_eq!(fx.engine.timer_count(), 0);

    fx.source.fail_create.store(false, Ordering::SeqCst);
    fx.source.fail_arm.store(true, Ordering::SeqCst);
    let err = fx.engine.arm_timer(me, 10, false).expect_err("arm refused");
    assert!(err.is_resource_exhaustion());
    assert_eq!(fx.engine.timer_count(), 0);
    assert!(fx.source.slots.lock().is_empty(), "source released");
}

#[test]
fn test_restart_transitions() {
    let fx = fixture();
    let me = ThreadId::current();
    let id = fx.engine.arm_timer(me, 10, false).expect("arm");
    fx.source.fire_all();
    assert_eq!(fx.engine.timer_state(id), Some(TimerState::Expired));

    fx.engine.restart_timer(id, 20, true).expect("restart");
    let record = fx.engine.timer_record(id).expect("record");
    assert_eq!(record.state, TimerState::Pending);
    assert!(record.periodic);
    assert_eq!(record.period_ms, 20);

    fx.engine.restart_timer(id, 0, true).expect("restart to idle");
    assert_eq!(fx.engine.timer_state(id), Some(TimerState::Idle));
    assert!(matches!(
        fx.engine.restart_timer(TimerId::from_raw(999), 10, false),
        Err(Error::UnknownTimer(_))
    ));
}

#[test]
fn test_drain_requires_owner_thread() {
    let fx = fixture();
    let me = ThreadId::current();
    fx.engine.arm_timer(me, 10, false).expect("arm");
    fx.source.fire_all();

    let err = thread::scope(|s| {
        s.spawn(|| fx.engine.drain_expired(me))
            .join()
            .expect("thread panicked")
    })
    .expect_err("foreign drain");
    assert!(matches!(err, Error::WrongThread { expected, .. } if expected == me));
    assert_eq!(fx.engine.pending_expired(me), 1);
}

#[test]
fn test_fire_signals_owner_ready_event() {
    let fx = fixture();
    let me = ThreadId::current();
    let ready = fx.engine.expired_signal(me).expect("signal");
    assert_eq!(fx.engine.expired_signal(me).expect("signal"), ready);
    fx.engine.arm_timer(me, 10, false).expect("arm");

    let primitive = fx.table.get(ready).expect("ready event");
    assert!(!primitive.status().is_available());
    fx.source.fire_all();

    let result = wait_multiple(
        &fx.registry,
        &[primitive],
        false,
        Some(Instant::now() + Duration::from_millis(100)),
        false,
    )
    .expect("wait");
    assert_eq!(result, WaitResult::Index(0));
}

#[test]
fn test_primitive_delivery() {
    let fx = fixture();
    let me = ThreadId::current();
    let timer = fx
        .table
        .insert(
            PrimitiveKind::Timer {
                periodic: false,
                period_ms: 10,
                auto_reset: true,
            },
            InitialState::Signaled,
            me,
        )
        .expect("timer primitive");
    let id = fx
        .engine
        .create_timer(me, Delivery::Primitive(timer.handle()))
        .expect("create");
    assert_eq!(fx.engine.timer_state(id), Some(TimerState::Idle));
    timer.clear_signal().expect("clear");

    fx.engine.restart_timer(id, 10, false).expect("arm");
    fx.source.fire_all();
    assert!(matches!(
        timer.status(),
        PrimitiveStatus::Timer { signaled: true, .. }
    ));
    assert_eq!(fx.engine.pending_expired(me), 0);
    assert!(!fx.engine.is_timer_active(id));
}

#[test]
fn test_queue_grows_past_warn_threshold() {
    let fx = fixture();
    let me = ThreadId::current();
    fx.engine.arm_timer(me, 10, true).expect("arm");
    for _ in 0..10 {
        fx.source.fire_all();
    }
    assert_eq!(fx.engine.pending_expired(me), 10);
    assert_eq!(fx.engine.drain_expired(me).expect("drain").len(), 10);
}

#[test]
fn test_cancel_all() {
    let fx = fixture();
    let me = ThreadId::current();
    for period in [10, 20, 30] {
        fx.engine.arm_timer(me, period, false).expect("arm");
    }
    assert_eq!(fx.engine.cancel_all(), 3);
    assert_eq!(fx.engine.timer_count(), 0);
    assert_eq!(fx.source.fire_all(), 0);
}

#[test]
fn test_timestamp_halves_in_entry() {
    let ts = crate::core::Timestamp::from_parts(7, 9);
    let entry = ExpiredTimerEntry::new(TimerId::from_raw(3), ts, 1);
    assert_eq!((entry.high, entry.low), (7, 9));
    assert_eq!(entry.expired_at(), ts);
}
