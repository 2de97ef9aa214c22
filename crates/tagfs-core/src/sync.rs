//! Synchronization primitives.
//!
//! The teacher kernel splits inode locking into two tiers: a short
//! spinlock-guarded critical section over cache identity/refcount, and a
//! longer, sleepable exclusion over contents held across disk I/O (see
//! `kernel::sync::{spin_lock, sleep_lock}`). In a hosted, threaded setting
//! the spinlock tier is just an ordinary mutex — [`mutex_api::Mutex`] is
//! already implemented for [`std::sync::Mutex`], so no separate spinlock
//! type is needed here.
//!
//! What *does* need a purpose-built type is the sleepable tier: a lock that
//! a thread can block on (rather than busy-spin) while another thread holds
//! it across I/O. [`SleepLock`] provides that atop [`std::sync::Condvar`].

use std::sync::{Condvar, Mutex};

/// A lock that blocks the waiting thread instead of spinning, for use
/// across sections that may perform I/O.
pub struct SleepLock {
    locked: Mutex<bool>,
    released: Condvar,
}

/// RAII guard for [`SleepLock`].
pub struct SleepLockGuard<'a> {
    lock: &'a SleepLock,
}

impl SleepLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    /// Blocks the current thread until the lock is acquired.
    pub fn lock(&self) -> SleepLockGuard<'_> {
        let mut locked = self.locked.lock().unwrap_or_else(|e| e.into_inner());
        while *locked {
            locked = self.released.wait(locked).unwrap_or_else(|e| e.into_inner());
        }
        *locked = true;
        SleepLockGuard { lock: self }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_>> {
        let mut locked = self.locked.lock().unwrap_or_else(|e| e.into_inner());
        if *locked {
            return None;
        }
        *locked = true;
        Some(SleepLockGuard { lock: self })
    }

    /// Returns whether the lock is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        *self.locked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SleepLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SleepLockGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self.lock.locked.lock().unwrap_or_else(|e| e.into_inner());
        *locked = false;
        self.lock.released.notify_one();
    }
}
