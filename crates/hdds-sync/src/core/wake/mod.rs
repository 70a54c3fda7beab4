// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-thread private wake signal.
//!
//! Every thread that blocks in a wait owns exactly one [`ThreadSignal`].
//! Notifiers never block: they flip a flag and wake the sleeper, which then
//! re-reads its registry entry to learn why it was woken.
//!
//! # Backends
//! - [`WakeBackend::Condvar`]: atomic fast-path plus parking_lot condvar (portable)
//! - [`WakeBackend::EventFd`]: eventfd + poll (Linux only)

mod condvar;
#[cfg(target_os = "linux")]
mod eventfd;

use super::ThreadId;
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Wake signal implementation selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeBackend {
    Condvar,
    EventFd,
}

impl WakeBackend {
    /// Parse a backend name (`condvar`, `eventfd`), case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "condvar" => Some(WakeBackend::Condvar),
            "eventfd" => Some(WakeBackend::EventFd),
            _ => None,
        }
    }

    /// True if this backend can be built on the current target.
    pub const fn is_supported(self) -> bool {
        match self {
            WakeBackend::Condvar => true,
            WakeBackend::EventFd => cfg!(target_os = "linux"),
        }
    }
}

enum Backend {
    Condvar(condvar::CondvarWake),
    #[cfg(target_os = "linux")]
    EventFd(eventfd::EventFdWake),
}

/// Private wake signal of one thread.
///
/// Carries the pending-notification state and the thread's alert flag. An
/// alert interrupts alertable waits only; it never touches primitive state.
pub struct ThreadSignal {
    thread: ThreadId,
    /// OS thread that first waited on this signal
    bound: Mutex<Option<std::thread::ThreadId>>,
    alerted: AtomicBool,
    backend: Backend,
}

impl ThreadSignal {
    /// Create the signal for `thread` on the requested backend.
    pub fn new(thread: ThreadId, backend: WakeBackend) -> Result<Self> {
        let backend = match backend {
            WakeBackend::Condvar => Backend::Condvar(condvar::CondvarWake::new()),
            #[cfg(target_os = "linux")]
            WakeBackend::EventFd => Backend::EventFd(eventfd::EventFdWake::new()?),
            #[cfg(not(target_os = "linux"))]
            WakeBackend::EventFd => {
                return Err(crate::error::Error::Fatal(
                    "eventfd wake backend requires Linux".to_string(),
                ))
            }
        };
        Ok(Self {
            thread,
            bound: Mutex::new(None),
            alerted: AtomicBool::new(false),
            backend,
        })
    }

    /// Thread this signal belongs to.
    #[inline]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Bind the signal to the calling thread on its first wait.
    ///
    /// Returns `false` if a different thread already waited on it, which
    /// means the kernel reused the thread id of an exited thread.
    pub fn claim(&self) -> bool {
        let current = std::thread::current().id();
        let mut bound = self.bound.lock();
        match *bound {
            Some(owner) => owner == current,
            None => {
                *bound = Some(current);
                true
            }
        }
    }

    /// Wake the owning thread (never blocks).
    #[inline]
    pub fn notify(&self) {
        match &self.backend {
            Backend::Condvar(b) => b.notify(),
            #[cfg(target_os = "linux")]
            Backend::EventFd(b) => b.notify(),
        }
    }

    /// Block until notified or `deadline` passes (`None` = forever).
    ///
    /// Returns `true` if a notification was consumed. Callers must re-check
    /// their wake condition: notifications may be stale.
    pub fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let timeout = match deadline {
            Some(d) => {
                let now = Instant::now();
                if d <= now {
                    return self.clear();
                }
                Some(d - now)
            }
            None => None,
        };
        match &self.backend {
            Backend::Condvar(b) => b.wait_timeout(timeout),
            #[cfg(target_os = "linux")]
            Backend::EventFd(b) => b.wait_timeout(timeout),
        }
    }

    /// Consume a pending notification without blocking.
    pub fn clear(&self) -> bool {
        match &self.backend {
            Backend::Condvar(b) => b.check_and_clear(),
            #[cfg(target_os = "linux")]
            Backend::EventFd(b) => b.check_and_clear(),
        }
    }

    /// Raise the alert flag and wake the thread.
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.notify();
    }

    /// Consume the alert flag.
    #[inline]
    pub fn take_alert(&self) -> bool {
        self.alerted.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ThreadSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Condvar(_) => WakeBackend::Condvar,
            #[cfg(target_os = "linux")]
            Backend::EventFd(_) => WakeBackend::EventFd,
        };
        f.debug_struct("ThreadSignal")
            .field("thread", &self.thread)
            .field("backend", &backend)
            .field("alerted", &self.is_alerted())
            .finish()
    }
}
