// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS-Sync configuration.
//!
//! - **Level 1 (Static)**: compile-time limits and defaults
//! - **Level 2 (Dynamic)**: [`SyncConfig`], built programmatically or from the
//!   environment, handed to [`SyncContext::new`](crate::SyncContext::new)
//!
//! ## Environment
//! - `HDDS_SYNC_MAX_WAIT_OBJECTS`: wait-set size limit (1-64, default 64)
//! - `HDDS_SYNC_WAKE_BACKEND`: `condvar` (default) or `eventfd` (Linux only)
//! - `HDDS_SYNC_SPIN_ITERATIONS`: spinlock busy-wait budget before yielding
//! - `HDDS_SYNC_EXPIRED_WARN_LEN`: owner queue length that triggers a warning

use crate::core::WakeBackend;
use crate::error::{Error, Result};
use std::env;

// =======================================================================
// Static limits
// =======================================================================

/// Platform-wide maximum number of objects in one wait set.
pub const MAXIMUM_WAITING_OBJECTS: usize = 64;

/// Timeout value meaning "wait forever".
pub const WAIT_INFINITE: u32 = u32::MAX;

/// Timeout value meaning "do not block".
pub const WAIT_NONE: u32 = 0;

/// Spinlock busy-wait iterations before the acquirer starts yielding.
pub const DEFAULT_SPIN_ITERATIONS: u32 = 1_000;

/// Owner expired-queue length above which a warning is logged.
///
/// Owners that never drain their queue are a caller contract violation;
/// expirations keep accumulating but nothing crashes.
pub const DEFAULT_EXPIRED_QUEUE_WARN_LEN: usize = 1_024;

/// Name of the timer service thread that runs fire callbacks.
pub const TIMER_SERVICE_THREAD_NAME: &str = "hdds-sync-timer";

// =======================================================================
// Environment variable names
// =======================================================================

pub const ENV_MAX_WAIT_OBJECTS: &str = "HDDS_SYNC_MAX_WAIT_OBJECTS";
pub const ENV_WAKE_BACKEND: &str = "HDDS_SYNC_WAKE_BACKEND";
pub const ENV_SPIN_ITERATIONS: &str = "HDDS_SYNC_SPIN_ITERATIONS";
pub const ENV_EXPIRED_WARN_LEN: &str = "HDDS_SYNC_EXPIRED_WARN_LEN";

// =======================================================================
// Runtime configuration
// =======================================================================

/// Runtime configuration for a [`SyncContext`](crate::SyncContext).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum wait-set size accepted by `wait_multiple` (1..=64).
    pub max_wait_objects: usize,

    /// Backend used for per-thread wake signals.
    pub wake_backend: WakeBackend,

    /// Spinlock busy-wait budget before yielding the CPU.
    pub spin_iterations: u32,

    /// Owner expired-queue length that triggers a warning.
    pub expired_queue_warn_len: usize,

    /// Name given to the timer service thread.
    pub timer_thread_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_wait_objects: MAXIMUM_WAITING_OBJECTS,
            wake_backend: WakeBackend::Condvar,
            spin_iterations: DEFAULT_SPIN_ITERATIONS,
            expired_queue_warn_len: DEFAULT_EXPIRED_QUEUE_WARN_LEN,
            timer_thread_name: TIMER_SERVICE_THREAD_NAME.to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Absent or unparsable values fall back to the defaults; the wait-object
    /// limit is clamped to `1..=MAXIMUM_WAITING_OBJECTS`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_wait_objects = env::var(ENV_MAX_WAIT_OBJECTS)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .map(|n| n.clamp(1, MAXIMUM_WAITING_OBJECTS))
            .unwrap_or(defaults.max_wait_objects);

        let wake_backend = env::var(ENV_WAKE_BACKEND)
            .ok()
            .and_then(|s| WakeBackend::parse(&s))
            .unwrap_or(defaults.wake_backend);

        let spin_iterations = env::var(ENV_SPIN_ITERATIONS)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(defaults.spin_iterations);

        let expired_queue_warn_len = env::var(ENV_EXPIRED_WARN_LEN)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.expired_queue_warn_len);

        Self {
            max_wait_objects,
            wake_backend,
            spin_iterations,
            expired_queue_warn_len,
            ..defaults
        }
    }

    /// Set the wait-set size limit.
    #[must_use]
    pub fn with_max_wait_objects(mut self, max: usize) -> Self {
        self.max_wait_objects = max;
        self
    }

    /// Select the wake signal backend.
    #[must_use]
    pub fn with_wake_backend(mut self, backend: WakeBackend) -> Self {
        self.wake_backend = backend;
        self
    }

    /// Set the spinlock busy-wait budget.
    #[must_use]
    pub fn with_spin_iterations(mut self, iterations: u32) -> Self {
        self.spin_iterations = iterations;
        self
    }

    /// Set the owner queue warning threshold.
    #[must_use]
    pub fn with_expired_queue_warn_len(mut self, len: usize) -> Self {
        self.expired_queue_warn_len = len;
        self
    }

    /// Set the timer service thread name.
    #[must_use]
    pub fn with_timer_thread_name(mut self, name: impl Into<String>) -> Self {
        self.timer_thread_name = name.into();
        self
    }

    /// Check limits and platform support.
    pub fn validate(&self) -> Result<()> {
        if self.max_wait_objects == 0 || self.max_wait_objects > MAXIMUM_WAITING_OBJECTS {
            return Err(Error::InvalidConfig(format!(
                "max_wait_objects must be 1..={} (got {})",
                MAXIMUM_WAITING_OBJECTS, self.max_wait_objects
            )));
        }
        if self.expired_queue_warn_len == 0 {
            return Err(Error::InvalidConfig(
                "expired_queue_warn_len must be > 0".to_string(),
            ));
        }
        if !self.wake_backend.is_supported() {
            return Err(Error::InvalidConfig(format!(
                "wake backend {:?} not supported on this platform",
                self.wake_backend
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SyncConfig::default();
        assert_eq!(config.max_wait_objects, MAXIMUM_WAITING_OBJECTS);
        assert_eq!(config.wake_backend, WakeBackend::Condvar);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_limits() {
        let zero = SyncConfig::default().with_max_wait_objects(0);
        assert!(matches!(zero.validate(), Err(Error::InvalidConfig(_))));

        let too_big = SyncConfig::default().with_max_wait_objects(MAXIMUM_WAITING_OBJECTS + 1);
        assert!(too_big.validate().is_err());

        let no_warn = SyncConfig::default().with_expired_queue_warn_len(0);
        assert!(no_warn.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = SyncConfig::default()
            .with_max_wait_objects(8)
            .with_spin_iterations(10)
            .with_timer_thread_name("custom-timer");
        assert_eq!(config.max_wait_objects, 8);
        assert_eq!(config.spin_iterations, 10);
        assert_eq!(config.timer_thread_name, "custom-timer");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_eventfd_supported_on_linux() {
        let config = SyncConfig::default().with_wake_backend(WakeBackend::EventFd);
        assert!(config.validate().is_ok());
    }
}
