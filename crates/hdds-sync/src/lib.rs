// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS-Sync: waitable primitives, multi-object wait and timer dispatch.
//!
//! Dispatcher threads block on heterogeneous primitives (locks, semaphores,
//! events, timers) through one call and receive timer expirations as
//! ordered entries in their own queue, without polling.
//!
//! # Quick Start
//!
//! ```no_run
//! use hdds_sync::{SyncConfig, SyncContext, ThreadId, WaitResult};
//!
//! let ctx = SyncContext::new(SyncConfig::default())?;
//! let me = ThreadId::current();
//!
//! let ready = ctx.expired_signal(me)?;
//! let timer = ctx.arm_timer(me, 50, false)?;
//!
//! if ctx.wait_multiple(&[ready], false, 500, false)? == WaitResult::Index(0) {
//!     for entry in ctx.drain_expired(me)? {
//!         assert_eq!(entry.timer_id, timer);
//!     }
//! }
//! # Ok::<(), hdds_sync::Error>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! SyncContext
//!   ├── PrimitiveTable   handle -> Primitive (state + waiter list)
//!   ├── WaitRegistry     waiter entries + per-thread ThreadSignal
//!   └── TimerEngine      TimerRecord table, per-owner ExpiredQueue
//!         └── TimerSource  (ThreadTimerSource service thread)
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod sync;
pub mod timer;
pub mod wait;

pub use config::{SyncConfig, MAXIMUM_WAITING_OBJECTS, WAIT_INFINITE, WAIT_NONE};
pub use context::SyncContext;
pub use crate::core::{ThreadId, Timestamp, WakeBackend};
pub use error::{Error, Result};
pub use sync::{Handle, InitialState, PrimitiveKind, PrimitiveStatus};
pub use timer::{
    Delivery, ExpiredTimerEntry, FireCallback, SourceId, TimerId, TimerRecord, TimerSource,
    TimerState,
};
pub use wait::{AcquireResult, WaitResult};
