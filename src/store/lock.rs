//! Intra-process lock table for tile handles.
//!
//! One table per storage root, shared by `Arc` with every tile handle.
//! Entries are keyed by the tile's canonical path and guarded by a single
//! mutex/condition-variable pair; critical sections are O(1) map
//! operations, so the global contention is cheap.
//!
//! Locking is advisory and cooperative: the engine never acquires locks
//! on behalf of read or write, and nothing stops a caller from skipping
//! them. Waiters are woken in a broadcast rather than FIFO order, so a
//! blocked exclusive acquirer can starve under continuous shared traffic;
//! that is an accepted property of this design.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Lock-table errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// A blocked acquire was interrupted via [`LockTable::interrupt`]
    #[error("lock acquisition interrupted")]
    Interrupted,

    /// A bounded shared acquire timed out
    #[error("timed out waiting for lock")]
    Timeout,

    /// Release called without holding the lock, or in the wrong mode.
    ///
    /// The table itself stays consistent; only the misusing caller is
    /// told.
    #[error("lock protocol misuse: {op}({path})")]
    Misuse {
        /// Operation that detected the misuse
        op: &'static str,
        /// Canonical path of the tile involved
        path: String,
    },
}

/// State of one locked tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    /// Held by `n >= 1` concurrent readers
    Shared(u32),
    /// Held by one writer
    Exclusive,
}

/// Blocking shared/exclusive lock table keyed by canonical tile path.
///
/// An absent entry means unlocked. Entries are created on first
/// acquisition and removed when the last holder releases.
pub struct LockTable {
    entries: Mutex<HashMap<String, LockState>>,
    cond: Condvar,
    interrupted: AtomicBool,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Interrupt all blocked acquires.
    ///
    /// Every thread currently waiting (and any that waits afterwards)
    /// fails with [`LockError::Interrupted`]. Used by the host during
    /// shutdown; held locks are unaffected.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        let _guard = self.entries.lock().unwrap();
        self.cond.notify_all();
    }

    /// Clear a previous interrupt so acquires may block again.
    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    /// Acquire the exclusive (write) lock for `path`.
    ///
    /// Blocks without bound while any lock entry exists for the path.
    pub fn acquire_exclusive(&self, path: &str) -> Result<(), LockError> {
        let mut entries = self.entries.lock().unwrap();
        loop {
            if !entries.contains_key(path) {
                entries.insert(path.to_string(), LockState::Exclusive);
                return Ok(());
            }
            entries = self.cond.wait(entries).unwrap();
            if self.interrupted.load(Ordering::SeqCst) {
                tracing::error!(path, "acquire_exclusive interrupted");
                return Err(LockError::Interrupted);
            }
        }
    }

    /// Release the exclusive lock for `path` and wake all waiters.
    pub fn release_exclusive(&self, path: &str) -> Result<(), LockError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(LockState::Exclusive) => {
                entries.remove(path);
                self.cond.notify_all();
                Ok(())
            }
            Some(LockState::Shared(_)) => {
                tracing::error!(path, "release_exclusive on read-locked tile");
                Err(LockError::Misuse {
                    op: "release_exclusive",
                    path: path.to_string(),
                })
            }
            None => {
                tracing::error!(path, "release_exclusive on unlocked tile");
                Err(LockError::Misuse {
                    op: "release_exclusive",
                    path: path.to_string(),
                })
            }
        }
    }

    /// Acquire a shared (read) lock for `path`.
    ///
    /// Shared holders stack; an exclusive holder makes the caller wait,
    /// bounded by `timeout` if given, unbounded otherwise. A zero timeout
    /// degrades to a try-lock against an exclusive holder.
    pub fn acquire_shared(&self, path: &str, timeout: Option<Duration>) -> Result<(), LockError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut entries = self.entries.lock().unwrap();
        loop {
            match entries.get_mut(path) {
                None => {
                    entries.insert(path.to_string(), LockState::Shared(1));
                    return Ok(());
                }
                Some(LockState::Shared(n)) => {
                    *n += 1;
                    return Ok(());
                }
                Some(LockState::Exclusive) => {
                    entries = match deadline {
                        None => self.cond.wait(entries).unwrap(),
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return Err(LockError::Timeout);
                            }
                            let (guard, _) =
                                self.cond.wait_timeout(entries, deadline - now).unwrap();
                            guard
                        }
                    };
                    if self.interrupted.load(Ordering::SeqCst) {
                        tracing::error!(path, "acquire_shared interrupted");
                        return Err(LockError::Interrupted);
                    }
                }
            }
        }
    }

    /// Release one shared lock for `path`; the last holder removes the
    /// entry and wakes all waiters.
    pub fn release_shared(&self, path: &str) -> Result<(), LockError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(path) {
            Some(LockState::Shared(n)) if *n > 1 => {
                *n -= 1;
                Ok(())
            }
            Some(LockState::Shared(_)) => {
                entries.remove(path);
                self.cond.notify_all();
                Ok(())
            }
            Some(LockState::Exclusive) => {
                tracing::error!(path, "release_shared on write-locked tile");
                Err(LockError::Misuse {
                    op: "release_shared",
                    path: path.to_string(),
                })
            }
            None => {
                tracing::error!(path, "release_shared on unlocked tile");
                Err(LockError::Misuse {
                    op: "release_shared",
                    path: path.to_string(),
                })
            }
        }
    }

    /// Number of locked tiles, for diagnostics.
    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
