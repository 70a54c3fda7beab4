// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OS thread identity.

use std::fmt;

/// Identity of an OS thread.
///
/// Taken from the kernel thread id on Linux and from `pthread_self` on other
/// unix targets. Stable for the lifetime of the thread; never zero for a live
/// thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

thread_local! {
    static CURRENT: ThreadId = ThreadId(platform::current_os_id());
}

impl ThreadId {
    /// Sentinel for "no thread".
    pub const INVALID: ThreadId = ThreadId(0);

    /// Identity of the calling thread.
    #[inline]
    pub fn current() -> Self {
        CURRENT.with(|id| *id)
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[cfg(target_os = "linux")]
mod platform {
    pub fn current_os_id() -> u64 {
        // SAFETY: gettid has no preconditions and cannot fail.
        let tid = unsafe { libc::syscall(libc::SYS_gettid) };
        tid as u64
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
mod platform {
    pub fn current_os_id() -> u64 {
        // SAFETY: pthread_self has no preconditions and cannot fail.
        let handle = unsafe { libc::pthread_self() };
        handle as usize as u64
    }
}

#[cfg(not(unix))]
mod platform {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT: AtomicU64 = AtomicU64::new(1);

    pub fn current_os_id() -> u64 {
        NEXT.fetch_add(1, Ordering::Relaxed)
    }
}
