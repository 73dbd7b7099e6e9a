//! Spin locks.

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use super::{Guard, Lock, RawLock};
use crate::cpu::{Cpu, CPUS};

/// Mutual exclusion lock that busy waits (spins).
pub struct RawSpinlock {
    /// Name of lock, for diagnostics.
    name: &'static str,

    /// The CPU holding the lock; null when unlocked.
    locked: AtomicPtr<Cpu>,
}

/// Locks that busy wait.
pub type SpinLock<T> = Lock<RawSpinlock, T>;
/// Guards of `SpinLock<T>`.
pub type SpinLockGuard<'s, T> = Guard<'s, RawSpinlock, T>;

impl RawSpinlock {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            locked: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Check whether this CPU holds the lock.
    /// Interrupts must be off.
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed) == CPUS.current()
    }
}

impl RawLock for RawSpinlock {
    /// Loops (spins) until the lock is acquired.
    ///
    /// The `Acquire` exchange pairs with the `Release` store in
    /// `release`, so stores from the previous critical section are
    /// visible to this one.
    fn acquire(&self) {
        // Disable interrupts to avoid deadlock with an interrupt
        // handler taking the same lock.
        // SAFETY: paired with the pop_off in release.
        unsafe { CPUS.push_off() };
        assert!(!self.holding(), "acquire {}", self.name);

        while self
            .locked
            .compare_exchange(
                ptr::null_mut(),
                CPUS.current(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    fn release(&self) {
        assert!(self.holding(), "release {}", self.name);

        self.locked.store(ptr::null_mut(), Ordering::Release);
        // SAFETY: paired with the push_off in acquire.
        unsafe { CPUS.pop_off() };
    }
}

impl<T> SpinLock<T> {
    /// Returns a new `SpinLock` named `name` protecting `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            lock: RawSpinlock::new(name),
            data: UnsafeCell::new(data),
        }
    }
}
