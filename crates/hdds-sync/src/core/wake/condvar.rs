// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Condvar wake backend: atomic flag fast-path, condvar when sleeping.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub(super) struct CondvarWake {
    /// Pending notification
    ready: AtomicBool,
    /// True while the owner sleeps on the condvar
    sleeping: Mutex<bool>,
    condvar: Condvar,
}

impl CondvarWake {
    pub(super) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(super) fn notify(&self) {
        self.ready.store(true, Ordering::Release);

        // The sleeper holds `sleeping` from its last flag check until the
        // condvar releases it, so this cannot slip between the two.
        if *self.sleeping.lock() {
            self.condvar.notify_one();
        }
    }

    #[inline]
    pub(super) fn check_and_clear(&self) -> bool {
        self.ready.swap(false, Ordering::Acquire)
    }

    pub(super) fn wait_timeout(&self, timeout: Option<Duration>) -> bool {
        if self.check_and_clear() {
            return true;
        }

        let mut sleeping = self.sleeping.lock();
        if self.check_and_clear() {
            return true;
        }

        *sleeping = true;
        match timeout {
            Some(t) => {
                let _ = self.condvar.wait_for(&mut sleeping, t);
            }
            None => self.condvar.wait(&mut sleeping),
        }
        *sleeping = false;

        self.check_and_clear()
    }
}
