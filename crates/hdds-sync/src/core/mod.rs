// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Platform services consumed by the synchronization core.
//!
//! - [`ThreadId`]: OS thread identity used to validate lock and timer ownership
//! - [`Timestamp`]: 64-bit local timestamps split into 32-bit halves
//! - [`ThreadSignal`]: per-thread private wake signal used for waiter handoff

pub mod clock;
pub mod thread;
pub mod wake;

pub use clock::{deadline_after, Timestamp};
pub use thread::ThreadId;
pub use wake::{ThreadSignal, WakeBackend};
