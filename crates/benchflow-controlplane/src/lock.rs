//! Serializable run locks
//!
//! A run guards each shared resource map (networks, firewalls, VPN
//! gateways and tunnels) with a lock whose held/free state survives
//! freeze/restore. A snapshot taken while a lock is held restores into a
//! run whose lock is held again, so a resumed run observes the same
//! exclusion it froze with.

use std::mem;
use std::sync::{Mutex, MutexGuard, TryLockError};

/// A mutex whose held state can be probed and re-established, so it can
/// round-trip through a run snapshot.
#[derive(Debug, Default)]
pub struct RunLock {
    inner: Mutex<()>,
}

/// Guard for an acquired [`RunLock`]. Dropping it releases the lock.
pub struct RunLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is acquired.
    pub fn acquire(&self) -> RunLockGuard<'_> {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        RunLockGuard { _guard: guard }
    }

    /// Acquires the lock if it is free.
    pub fn try_acquire(&self) -> Option<RunLockGuard<'_>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(RunLockGuard { _guard: guard }),
            Err(TryLockError::Poisoned(poisoned)) => Some(RunLockGuard {
                _guard: poisoned.into_inner(),
            }),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Whether the lock is currently held.
    pub fn is_held(&self) -> bool {
        matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Acquires the lock and leaks the guard, leaving the lock held for
    /// the lifetime of the `RunLock`. Used when restoring a snapshot that
    /// recorded the lock as held; only call on a freshly constructed lock.
    pub fn hold(&self) {
        match self.inner.lock() {
            Ok(guard) => mem::forget(guard),
            Err(poisoned) => mem::forget(poisoned.into_inner()),
        }
    }
}
