// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multi-object wait.
//!
//! [`WaitRegistry`] emulates "block until any/all of N primitives signal" on
//! top of per-primitive waiter lists and per-thread wake signals.
//! [`wait_multiple`] is the blocking entry point built on it.
//!
//! # Lock order
//! primitive slot (ascending handle when several) -> registry entries.
//! Nothing takes a primitive lock while holding the registry lock.

mod multi;
mod registry;


pub use multi::{validate_wait_set, wait_multiple, AcquireResult, WaitResult};
pub use registry::WaitRegistry;
pub(crate) use registry::WaiterRef;
