//! Mutual exclusion.
//!
//! A [`Lock`] pairs a raw lock with the data it protects; a [`Guard`]
//! is the proof of acquisition and the only path to the data. The
//! scheduler handoff needs to release a lock acquired on another
//! kernel stack, so [`Lock::unlock`] exists for the one place a guard
//! cannot travel across `swtch`.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

mod spinlock;

pub use spinlock::{RawSpinlock, SpinLock, SpinLockGuard};

pub trait RawLock {
    /// Acquires the lock.
    fn acquire(&self);
    /// Releases the lock.
    fn release(&self);
}

/// Locks that provide mutual exclusion and own their raw lock.
pub struct Lock<R: RawLock, T> {
    lock: R,
    data: UnsafeCell<T>,
}

// SAFETY: the raw lock serializes access to the data.
unsafe impl<R: RawLock, T: Send> Sync for Lock<R, T> {}

/// Guards that guarantee exclusive access to the lock's data.
pub struct Guard<'s, R: RawLock, T> {
    lock: &'s Lock<R, T>,
    _marker: PhantomData<*const ()>,
}

// Do not implement Send; a lock must be released by the CPU that
// acquired it.
unsafe impl<R: RawLock, T: Sync> Sync for Guard<'_, R, T> {}

impl<R: RawLock, T> Lock<R, T> {
    /// Acquires the lock and returns its guard.
    pub fn lock(&self) -> Guard<'_, R, T> {
        self.lock.acquire();

        Guard {
            lock: self,
            _marker: PhantomData,
        }
    }

    /// Returns a raw pointer to the inner data.
    /// The caller must ensure that accessing the pointer does not race.
    pub fn get_mut_raw(&self) -> *mut T {
        self.data.get()
    }

    /// Returns a mutable reference to the inner data.
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: we have a mutable reference to the lock.
        unsafe { &mut *self.get_mut_raw() }
    }

    pub fn raw_lock(&self) -> &R {
        &self.lock
    }

    /// Releases the lock without a guard.
    ///
    /// # Safety
    ///
    /// Use only when the lock was acquired and its guard was forgotten
    /// (the scheduler handoff).
    pub unsafe fn unlock(&self) {
        self.lock.release();
    }
}

impl<R: RawLock, T> Guard<'_, R, T> {
    /// Temporarily releases the lock and calls `f`.
    /// Reacquires the lock after `f` returns.
    pub fn reacquire_after<F, U>(&mut self, f: F) -> U
    where
        F: FnOnce() -> U,
    {
        self.lock.lock.release();
        let result = f();
        self.lock.lock.acquire();
        result
    }
}

impl<R: RawLock, T> Drop for Guard<'_, R, T> {
    fn drop(&mut self) {
        self.lock.lock.release();
    }
}

impl<R: RawLock, T> Deref for Guard<'_, R, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<R: RawLock, T> DerefMut for Guard<'_, R, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the guard holds the lock and `&mut self` is exclusive.
        unsafe { &mut *self.lock.data.get() }
    }
}
