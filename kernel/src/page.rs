//! Page type.

use core::mem;
use core::ops::{Deref, DerefMut};

use crate::memlayout::PGSIZE;

#[repr(align(4096))]
pub struct RawPage {
    bytes: [u8; PGSIZE],
}

impl RawPage {
    /// Workaround for non-const `Default::default`.
    pub const DEFAULT: Self = Self { bytes: [0; PGSIZE] };

    pub fn write_bytes(&mut self, value: u8) {
        self.bytes.fill(value);
    }
}

impl Deref for RawPage {
    type Target = [u8; PGSIZE];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl DerefMut for RawPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes
    }
}

/// An owned page from the `Kmem` arena.
///
/// Internal safety invariant:
/// - `inner` is 4096-byte aligned and lies inside the arena.
/// - Two different `Page`s never overlap.
///
/// A `Page` is a linear value: it must be returned to the allocator,
/// never dropped.
pub struct Page {
    inner: *mut RawPage,
}

// SAFETY: a page is plain memory owned by the holder of the `Page`.
unsafe impl Send for Page {}

impl Page {
    pub fn into_usize(self) -> usize {
        let addr = self.inner as usize;
        mem::forget(self);
        addr
    }

    /// # Safety
    ///
    /// `addr` must uphold the invariant of `Page`: page-aligned, inside
    /// the arena, and not aliased by another live `Page`.
    pub unsafe fn from_usize(addr: usize) -> Self {
        Self {
            inner: addr as *mut RawPage,
        }
    }

    pub fn addr(&self) -> usize {
        self.inner as usize
    }
}

impl Deref for Page {
    type Target = RawPage;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the invariant of `Page`.
        unsafe { &*self.inner }
    }
}

impl DerefMut for Page {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the invariant of `Page`; ownership is exclusive.
        unsafe { &mut *self.inner }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        panic!("Page must never drop.");
    }
}
