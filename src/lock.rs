//! Try-only locks shared by interrupt level and call level code.
//!
//! The periodic task cannot block, and call level code must not corrupt state
//! the periodic task is part way through updating.  Each lock is therefore a
//! single test-and-set bit: acquiring either succeeds or fails immediately,
//! and a failed acquire means "do nothing now, try again at the next
//! opportunity".  The locks are neither fair nor re-entrant.
//!
//! Acquiring returns a guard token.  Guards are _not_ scoped locks.  They must
//! be released explicitly, and dropping one without releasing it leaves the
//! lock held.  This is what allows the link lock to be carried by an in-flight
//! channel operation and released later by its completion handler.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::sync::atomic::{AtomicBool, Ordering};

/// A single bit, non-blocking lock.
pub struct TryLock(AtomicBool);

impl TryLock {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Test-and-set.  Returns whether the caller now owns the lock.
    pub fn try_acquire(&self) -> bool {
        !self.0.swap(true, Ordering::Acquire)
    }

    /// Clear the lock.  Never fails, and is harmless if the lock was not held.
    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The two locks of a link.
///
/// - The link lock guards all link state.  It is taken by the periodic task,
///   held across an in-flight channel operation, and taken by call level code
///   while it moves host bytes.
/// - The wake lock stops overlapping runs of the periodic task from both
///   waking pending host requests.
pub struct LinkLocks {
    link: TryLock,
    wake: TryLock,
}

impl LinkLocks {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            link: TryLock::new(),
            wake: TryLock::new(),
        }
    }

    pub fn try_link(&self) -> Option<LinkGuard<'_>> {
        if self.link.try_acquire() {
            Some(LinkGuard { lock: &self.link })
        } else {
            None
        }
    }

    pub fn try_wake(&self) -> Option<WakeGuard<'_>> {
        if self.wake.try_acquire() {
            Some(WakeGuard { lock: &self.wake })
        } else {
            None
        }
    }

    pub fn link_locked(&self) -> bool {
        self.link.is_locked()
    }

    pub fn wake_locked(&self) -> bool {
        self.wake.is_locked()
    }

    /// Recreate the guard for a link lock that is known to be held by an
    /// in-flight operation.  The caller is responsible for ensuring that the
    /// operation's ownership has been given up, so only one guard exists.
    pub(crate) fn reclaim_link(&self) -> LinkGuard<'_> {
        debug_assert!(self.link.is_locked());
        LinkGuard { lock: &self.link }
    }
}

/// Proof of holding the link lock.
#[must_use = "a LinkGuard must be released, or the link stays locked"]
pub struct LinkGuard<'a> {
    lock: &'a TryLock,
}

impl LinkGuard<'_> {
    pub fn release(self) {
        self.lock.release();
    }

    /// Give up the guard without releasing the lock, leaving it held by an
    /// in-flight operation.
    pub(crate) fn hand_off(self) {}

    pub(crate) fn guards(&self, locks: &LinkLocks) -> bool {
        core::ptr::eq(self.lock, &locks.link)
    }
}

/// Proof of holding the wake lock.
#[must_use = "a WakeGuard must be released, or wake passes stop"]
pub struct WakeGuard<'a> {
    lock: &'a TryLock,
}

impl WakeGuard<'_> {
    pub fn release(self) {
        self.lock.release();
    }
}
