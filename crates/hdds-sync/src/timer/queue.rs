// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-owner expired queue with its "has data" event.

use super::{ExpiredTimerEntry, TimerId};
use crate::core::ThreadId;
use crate::sync::{Handle, Primitive};
use crate::wait::WaitRegistry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct ExpiredQueue {
    owner: ThreadId,
    entries: Mutex<VecDeque<ExpiredTimerEntry>>,
    /// Auto-reset event, signaled on every push
    ready: Arc<Primitive>,
    warn_len: usize,
    warned: AtomicBool,
}

impl ExpiredQueue {
    pub(crate) fn new(owner: ThreadId, ready: Arc<Primitive>, warn_len: usize) -> Self {
        Self {
            owner,
            entries: Mutex::new(VecDeque::new()),
            ready,
            warn_len,
            warned: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn owner(&self) -> ThreadId {
        self.owner
    }

    #[inline]
    pub(crate) fn ready_handle(&self) -> Handle {
        self.ready.handle()
    }

    /// Append and wake the owner.
    pub(crate) fn push(&self, entry: ExpiredTimerEntry, registry: &WaitRegistry) {
        let len = {
            let mut entries = self.entries.lock();
            entries.push_back(entry);
            entries.len()
        };
        if len > self.warn_len && !self.warned.swap(true, Ordering::Relaxed) {
            log::warn!(
                "[timer] expired queue of {} holds {} entries; owner is not draining",
                self.owner,
                len
            );
        }
        if let Err(e) = self.ready.try_signal(registry) {
            log::debug!("[timer] ready signal for {} failed: {}", self.owner, e);
        }
    }

    /// Take every entry in fire order.
    ///
    /// The ready signal is cleared first so a push racing with the drain
    /// leaves it set rather than lost.
    pub(crate) fn drain(&self) -> Vec<ExpiredTimerEntry> {
        let _ = self.ready.clear_signal();
        let drained: Vec<_> = self.entries.lock().drain(..).collect();
        self.warned.store(false, Ordering::Relaxed);
        drained
    }

    /// Drop undelivered entries of one timer.
    pub(crate) fn purge(&self, timer_id: TimerId) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.timer_id != timer_id);
        before - entries.len()
    }

    pub(crate) fn count_for(&self, timer_id: TimerId) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.timer_id == timer_id)
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
