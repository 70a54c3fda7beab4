// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handle table: process-lifetime identities for primitives.

use super::{Handle, InitialState, Primitive, PrimitiveKind};
use crate::core::ThreadId;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maps handles to live primitives.
///
/// Handles come from a monotonic counter and are never reissued, so a stale
/// handle fails with [`Error::UnknownHandle`] instead of aliasing a newer
/// primitive.
pub struct PrimitiveTable {
    next: AtomicU64,
    map: DashMap<Handle, Arc<Primitive>>,
}

impl PrimitiveTable {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            map: DashMap::new(),
        }
    }

    /// Create a primitive and register it under a fresh handle.
    pub fn insert(
        &self,
        kind: PrimitiveKind,
        initial: InitialState,
        creator: ThreadId,
    ) -> Result<Arc<Primitive>> {
        let handle = Handle::from_raw(self.next.fetch_add(1, Ordering::Relaxed));
        let primitive = Arc::new(Primitive::new(handle, kind, initial, creator)?);
        self.map.insert(handle, Arc::clone(&primitive));
        log::debug!("[sync] created {} as {:?}", handle, kind);
        Ok(primitive)
    }

    pub fn get(&self, handle: Handle) -> Result<Arc<Primitive>> {
        self.map
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::UnknownHandle(handle))
    }

    /// Unregister a handle. Later lookups fail; holders of the `Arc` keep a
    /// primitive they must check for destruction.
    pub fn remove(&self, handle: Handle) -> Result<Arc<Primitive>> {
        self.map
            .remove(&handle)
            .map(|(_, primitive)| primitive)
            .ok_or(Error::UnknownHandle(handle))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for PrimitiveTable {
    fn default() -> Self {
        Self::new()
    }
}
