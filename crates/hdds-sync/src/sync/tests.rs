// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::core::{ThreadId, WakeBackend};
use crate::error::Error;
use crate::wait::WaitRegistry;
use std::thread;
use std::time::{Duration, Instant};

fn registry() -> WaitRegistry {
    WaitRegistry::new(WakeBackend::Condvar)
}

fn make(kind: PrimitiveKind, initial: InitialState) -> Primitive {
    Primitive::new(Handle::from_raw(1), kind, initial, ThreadId::current())
        .expect("primitive creation")
}

#[test]
fn test_lock_initial_states() {
    let free = make(PrimitiveKind::ExclusiveLock, InitialState::Unsignaled);
    assert_eq!(
        free.status(),
        PrimitiveStatus::Lock {
            owner: None,
            depth: 0
        }
    );
    assert!(free.status().is_available());

    let owned = make(PrimitiveKind::RecursiveLock, InitialState::Signaled);
    assert_eq!(
        owned.status(),
        PrimitiveStatus::Lock {
            owner: Some(ThreadId::current()),
            depth: 1
        }
    );
}

#[test]
fn test_release_requires_owner() {
    let reg = registry();
    let lock = make(PrimitiveKind::ExclusiveLock, InitialState::Unsignaled);
    let err = lock
        .release(ThreadId::current(), &reg)
        .expect_err("release of free lock");
    assert!(matches!(err, Error::NotOwner { owner: None, .. }));

    let owned = make(PrimitiveKind::ExclusiveLock, InitialState::Signaled);
    let stranger = ThreadId::from_raw(u64::MAX);
    assert!(matches!(
        owned.release(stranger, &reg),
        Err(Error::NotOwner { owner: Some(_), .. })
    ));
    owned
        .release(ThreadId::current(), &reg)
        .expect("owner release");
    assert!(owned.status().is_available());
}

#[test]
fn test_exclusive_reentry_rejected() {
    let lock = make(PrimitiveKind::ExclusiveLock, InitialState::Signaled);
    let slot = lock.lock_slot().expect("waitable");
    assert!(matches!(
        slot.state.check_entry(lock.handle(), ThreadId::current()),
        Err(Error::NonRecursiveReentry(_))
    ));
}

#[test]
fn test_semaphore_bounds() {
    let reg = registry();
    let sem = make(
        PrimitiveKind::Semaphore {
            max_count: 2,
            initial_count: 2,
        },
        InitialState::Unsignaled,
    );
    let err = sem
        .release(ThreadId::current(), &reg)
        .expect_err("over-release");
    assert!(matches!(err, Error::SemaphoreOverflow { max_count: 2 }));
    assert_eq!(
        sem.status(),
        PrimitiveStatus::Semaphore {
            max_count: 2,
            current_count: 2
        }
    );
    assert!(!sem.try_signal(&reg).expect("try_signal"));
}

#[test]
fn test_semaphore_creation_checks() {
    let me = ThreadId::current();
    assert!(matches!(
        Primitive::new(
            Handle::from_raw(1),
            PrimitiveKind::Semaphore {
                max_count: 0,
                initial_count: 0
            },
            InitialState::Unsignaled,
            me
        ),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        Primitive::new(
            Handle::from_raw(1),
            PrimitiveKind::Semaphore {
                max_count: 1,
                initial_count: 3
            },
            InitialState::Unsignaled,
            me
        ),
        Err(Error::SemaphoreOverflow { max_count: 1 })
    ));
}

#[test]
fn test_event_reset_rules() {
    let reg = registry();
    let manual = make(
        PrimitiveKind::Event { auto_reset: false },
        InitialState::Unsignaled,
    );
    assert!(manual.try_signal(&reg).expect("signal"));
    assert_eq!(manual.status(), PrimitiveStatus::Event { signaled: true });
    manual.reset().expect("manual reset");
    assert_eq!(manual.status(), PrimitiveStatus::Event { signaled: false });

    let auto = make(
        PrimitiveKind::Event { auto_reset: true },
        InitialState::Signaled,
    );
    assert!(matches!(auto.reset(), Err(Error::ResetNotSupported(_))));

    let lock = make(PrimitiveKind::RecursiveLock, InitialState::Unsignaled);
    assert!(matches!(lock.reset(), Err(Error::ResetNotSupported(_))));
    assert!(matches!(
        lock.try_signal(&reg),
        Err(Error::SignalNotSupported(_))
    ));
}

#[test]
fn test_consume_auto_vs_manual() {
    let me = ThreadId::current();
    let mut auto = State::Event {
        auto_reset: true,
        signaled: true,
    };
    auto.consume(me);
    assert!(!auto.is_consumable_for(me));

    let mut manual = State::Event {
        auto_reset: false,
        signaled: true,
    };
    manual.consume(me);
    assert!(manual.is_consumable_for(me));
}

#[test]
fn test_timer_consume_honors_reset_mode_and_cancel() {
    let me = ThreadId::current();
    let timer = |auto_reset, cancelled| State::Timer {
        auto_reset,
        signaled: true,
        cancelled,
        timer_id: crate::timer::TimerId::INVALID,
    };

    let mut auto = timer(true, false);
    auto.consume(me);
    assert!(!auto.is_consumable_for(me));

    let mut manual = timer(false, false);
    manual.consume(me);
    assert!(manual.is_consumable_for(me));

    let mut cancelled = timer(true, true);
    cancelled.consume(me);
    cancelled.consume(me);
    assert!(cancelled.is_consumable_for(me));
}

#[test]
fn test_released_timer_stays_signaled_until_cleared() {
    let reg = registry();
    let me = ThreadId::current();
    let timer = make(
        PrimitiveKind::Timer {
            periodic: false,
            period_ms: 10,
            auto_reset: true,
        },
        InitialState::Unsignaled,
    );
    timer.release(me, &reg).expect("release");
    for _ in 0..3 {
        timer.lock_slot().expect("slot").state.consume(me);
        assert!(timer.status().is_available());
    }

    timer.clear_signal().expect("clear");
    timer.try_signal(&reg).expect("fire");
    timer.lock_slot().expect("slot").state.consume(me);
    assert!(!timer.status().is_available());
}

#[test]
fn test_pulse_without_waiters_leaves_event_clear() {
    let reg = registry();
    for auto_reset in [true, false] {
        let event = make(PrimitiveKind::Event { auto_reset }, InitialState::Unsignaled);
        event.pulse(&reg).expect("pulse");
        assert_eq!(event.status(), PrimitiveStatus::Event { signaled: false });
    }

    let sem = make(
        PrimitiveKind::Semaphore {
            max_count: 2,
            initial_count: 0,
        },
        InitialState::Unsignaled,
    );
    assert!(matches!(
        sem.pulse(&reg),
        Err(Error::SignalNotSupported(_))
    ));
    let spin = make(PrimitiveKind::SpinLock, InitialState::Unsignaled);
    assert!(matches!(
        spin.pulse(&reg),
        Err(Error::SignalNotSupported(_))
    ));
}

#[test]
fn test_destroyed_primitive_rejects_operations() {
    let reg = registry();
    let event = make(
        PrimitiveKind::Event { auto_reset: true },
        InitialState::Unsignaled,
    );
    assert_eq!(event.destroy(&reg), 0);
    assert!(matches!(
        event.try_signal(&reg),
        Err(Error::PrimitiveDestroyed(_))
    ));
    assert!(matches!(
        event.release(ThreadId::current(), &reg),
        Err(Error::PrimitiveDestroyed(_))
    ));
}

#[test]
fn test_spinlock_contention() {
    let spin = std::sync::Arc::new(make(PrimitiveKind::SpinLock, InitialState::Unsignaled));
    let me = ThreadId::current();
    assert!(spin.spin_acquire(me, None, 10).expect("acquire"));
    assert!(matches!(
        spin.spin_acquire(me, None, 10),
        Err(Error::NonRecursiveReentry(_))
    ));

    let other = std::sync::Arc::clone(&spin);
    let polled = thread::spawn(move || {
        other
            .spin_acquire(ThreadId::current(), Some(Instant::now()), 10)
            .expect("poll")
    })
    .join()
    .expect("thread panicked");
    assert!(!polled, "held spinlock must not be taken");

    let reg = registry();
    spin.release(me, &reg).expect("release");
    assert!(spin.status().is_available());
}

#[test]
fn test_spinlock_times_out() {
    let spin = make(PrimitiveKind::SpinLock, InitialState::Signaled);
    let start = Instant::now();
    let got = thread::scope(|s| {
        s.spawn(|| {
            spin.spin_acquire(
                ThreadId::current(),
                Some(Instant::now() + Duration::from_millis(20)),
                100,
            )
        })
        .join()
        .expect("thread panicked")
    })
    .expect("spin");
    assert!(!got);
    assert!(start.elapsed() >= Duration::from_millis(15));
}

#[test]
fn test_table_handles_not_reused() {
    let table = PrimitiveTable::new();
    let me = ThreadId::current();
    let a = table
        .insert(PrimitiveKind::ExclusiveLock, InitialState::Unsignaled, me)
        .expect("insert")
        .handle();
    table.remove(a).expect("remove");
    let b = table
        .insert(PrimitiveKind::ExclusiveLock, InitialState::Unsignaled, me)
        .expect("insert")
        .handle();
    assert_ne!(a, b);
    assert!(matches!(table.get(a), Err(Error::UnknownHandle(h)) if h == a));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_kind_flags() {
    assert!(!PrimitiveKind::SpinLock.is_waitable());
    assert!(PrimitiveKind::Timer {
        periodic: false,
        period_ms: 10,
        auto_reset: true,
    }
    .is_waitable());
    assert!(PrimitiveKind::RecursiveLock.is_lock());
    assert!(!PrimitiveKind::Event { auto_reset: true }.is_lock());
}
