// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OS-level timer sources.
//!
//! [`TimerSource`] is the create/arm/disarm/delete surface the engine needs.
//! [`ThreadTimerSource`] implements it with one service thread that owns a
//! deadline heap and runs fire callbacks; callers talk to it over a channel.

use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Fire callback. Receives the token passed to the arming call.
pub type FireCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Identity of a timer source slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// One-shot/periodic timer facility with fire callbacks.
///
/// Callbacks may run on any thread and may race with `disarm`/`delete`;
/// the engine rejects such late fires with the arming token.
pub trait TimerSource: Send + Sync {
    /// Allocate a source bound to `callback`.
    fn create(&self, callback: FireCallback) -> Result<SourceId>;

    /// (Re)arm; replaces any previous schedule of this source.
    fn arm(&self, id: SourceId, period: Duration, periodic: bool, token: u64) -> Result<()>;

    /// Cancel the schedule, keeping the source.
    fn disarm(&self, id: SourceId) -> Result<()>;

    /// Release the source.
    fn delete(&self, id: SourceId) -> Result<()>;
}

enum Command {
    Create(SourceId, FireCallback),
    Arm {
        id: SourceId,
        period: Duration,
        periodic: bool,
        token: u64,
    },
    Disarm(SourceId),
    Delete(SourceId),
    Shutdown,
}

/// Timer source backed by a dedicated service thread.
pub struct ThreadTimerSource {
    tx: Sender<Command>,
    next_id: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadTimerSource {
    /// Spawn the service thread.
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_service(rx))
            .map_err(|e| Error::TimerSourceFailed(format!("spawn {}: {}", name, e)))?;

        Ok(Self {
            tx,
            next_id: AtomicU64::new(1),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(cmd)
            .map_err(|_| Error::TimerSourceFailed("timer service thread has exited".to_string()))
    }

    /// Stop the service thread. Pending schedules are dropped.
    pub fn shutdown(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        let _ = self.tx.send(Command::Shutdown);
        // A callback holding the last engine reference ends up here on the
        // service thread itself; it exits on the Shutdown command instead.
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }
}

impl TimerSource for ThreadTimerSource {
    fn create(&self, callback: FireCallback) -> Result<SourceId> {
        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send(Command::Create(id, callback))?;
        Ok(id)
    }

    fn arm(&self, id: SourceId, period: Duration, periodic: bool, token: u64) -> Result<()> {
        if period.is_zero() {
            return Err(Error::TimerSourceFailed("zero period".to_string()));
        }
        self.send(Command::Arm {
            id,
            period,
            periodic,
            token,
        })
    }

    fn disarm(&self, id: SourceId) -> Result<()> {
        self.send(Command::Disarm(id))
    }

    fn delete(&self, id: SourceId) -> Result<()> {
        self.send(Command::Delete(id))
    }
}

impl Drop for ThreadTimerSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadTimerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadTimerSource")
            .field("running", &self.is_running())
            .finish()
    }
}

// =======================================================================
// Service thread
// =======================================================================

struct Schedule {
    period: Duration,
    periodic: bool,
    token: u64,
}

struct SourceSlot {
    callback: FireCallback,
    /// Bumped on every arm/disarm; heap entries of older generations are stale
    generation: u64,
    schedule: Option<Schedule>,
}

type Deadline = Reverse<(Instant, SourceId, u64)>;

fn run_service(rx: Receiver<Command>) {
    log::debug!("[timer] service thread started");

    let mut sources: HashMap<SourceId, SourceSlot> = HashMap::new();
    let mut heap: BinaryHeap<Deadline> = BinaryHeap::new();

    loop {
        let received = match heap.peek() {
            Some(Reverse((deadline, _, _))) => rx.recv_deadline(*deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(cmd) => apply(cmd, &mut sources, &mut heap),
            Err(RecvTimeoutError::Timeout) => {}
        }

        fire_due(&mut sources, &mut heap);
    }

    log::debug!(
        "[timer] service thread stopped ({} sources dropped)",
        sources.len()
    );
}

fn apply(
    cmd: Command,
    sources: &mut HashMap<SourceId, SourceSlot>,
    heap: &mut BinaryHeap<Deadline>,
) {
    match cmd {
        Command::Create(id, callback) => {
            sources.insert(
                id,
                SourceSlot {
                    callback,
                    generation: 0,
                    schedule: None,
                },
            );
        }
        Command::Arm {
            id,
            period,
            periodic,
            token,
        } => {
            let Some(slot) = sources.get_mut(&id) else {
                log::debug!("[timer] arm for unknown source {:?}", id);
                return;
            };
            slot.generation += 1;
            slot.schedule = Some(Schedule {
                period,
                periodic,
                token,
            });
            heap.push(Reverse((Instant::now() + period, id, slot.generation)));
        }
        Command::Disarm(id) => {
            if let Some(slot) = sources.get_mut(&id) {
                slot.generation += 1;
                slot.schedule = None;
            }
        }
        Command::Delete(id) => {
            sources.remove(&id);
        }
        Command::Shutdown => {}
    }
}

fn fire_due(sources: &mut HashMap<SourceId, SourceSlot>, heap: &mut BinaryHeap<Deadline>) {
    let now = Instant::now();
    while let Some(Reverse((deadline, id, generation))) = heap.peek().copied() {
        if deadline > now {
            break;
        }
        heap.pop();

        let Some(slot) = sources.get_mut(&id) else {
            continue;
        };
        if slot.generation != generation {
            continue;
        }
        let Some(schedule) = slot.schedule.as_ref() else {
            continue;
        };

        let token = schedule.token;
        if schedule.periodic {
            // Missed periods collapse into one fire instead of a burst.
            let mut next = deadline + schedule.period;
            if next <= now {
                next = now + schedule.period;
            }
            heap.push(Reverse((next, id, generation)));
        } else {
            slot.schedule = None;
        }

        let callback = Arc::clone(&slot.callback);
        callback(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counter() -> (Arc<AtomicU32>, FireCallback) {
        let count = Arc::new(AtomicU32::new(0));
        let hits = Arc::clone(&count);
        let callback: FireCallback = Arc::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn test_one_shot_fires_once() {
        let source = ThreadTimerSource::spawn("test-timer").expect("spawn");
        let (count, callback) = counter();
        let id = source.create(callback).expect("create");
        source
            .arm(id, Duration::from_millis(10), false, 1)
            .expect("arm");
        thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disarm_before_deadline() {
        let source = ThreadTimerSource::spawn("test-timer").expect("spawn");
        let (count, callback) = counter();
        let id = source.create(callback).expect("create");
        source
            .arm(id, Duration::from_millis(30), true, 1)
            .expect("arm");
        source.disarm(id).expect("disarm");
        thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_token_is_forwarded() {
        let source = ThreadTimerSource::spawn("test-timer").expect("spawn");
        let seen = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&seen);
        let id = source
            .create(Arc::new(move |token| sink.store(token, Ordering::SeqCst)))
            .expect("create");
        source
            .arm(id, Duration::from_millis(5), false, 77)
            .expect("arm");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(seen.load(Ordering::SeqCst), 77);
    }

    #[test]
    fn test_shutdown_rejects_commands() {
        let source = ThreadTimerSource::spawn("test-timer").expect("spawn");
        source.shutdown();
        assert!(!source.is_running());
        let (_, callback) = counter();
        // The channel receiver is gone once the thread exits.
        assert!(matches!(
            source.create(callback),
            Err(Error::TimerSourceFailed(_))
        ));
    }

    #[test]
    fn test_zero_period_rejected() {
        let source = ThreadTimerSource::spawn("test-timer").expect("spawn");
        let (_, callback) = counter();
        let id = source.create(callback).expect("create");
        assert!(source.arm(id, Duration::ZERO, false, 1).is_err());
    }
}
