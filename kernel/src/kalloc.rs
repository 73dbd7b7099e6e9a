//! Physical memory allocator, for trapframes, kernel stacks and user
//! pages. Allocates whole 4096-byte pages from a static arena.

use core::mem;
use core::ptr;

use crate::lock::SpinLock;
use crate::page::{Page, RawPage};
use crate::param::NPAGE;

/// Backing storage handed to `Kmem` at boot.
static mut POOL: [RawPage; NPAGE] = [const { RawPage::DEFAULT }; NPAGE];

static KMEM: SpinLock<Kmem> = SpinLock::new("kmem", Kmem::new());

struct Run {
    next: *mut Run,
}

/// # Safety
///
/// - This singly linked list has no cycle.
/// - If head is non-null, it is the first element of a list of valid,
///   free pages.
pub struct Kmem {
    head: *mut Run,
}

// SAFETY: the free list is only touched under the KMEM lock.
unsafe impl Send for Kmem {}

impl Kmem {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
        }
    }

    /// Put every arena page on the free list.
    ///
    /// # Safety
    ///
    /// Must be called only once.
    unsafe fn init(&mut self) {
        let base = unsafe { ptr::addr_of_mut!(POOL) } as *mut RawPage;
        for i in 0..NPAGE {
            // SAFETY: arena pages are aligned, distinct, and handed out
            // exactly once.
            self.free(unsafe { Page::from_usize(base.add(i) as usize) });
        }
    }

    fn free(&mut self, page: Page) {
        let r = page.into_usize() as *mut Run;
        // SAFETY: by the invariant of `Page` this does not create a
        // cycle in the list.
        unsafe { (*r).next = self.head };
        self.head = r;
    }

    fn alloc(&mut self) -> Option<Page> {
        if self.head.is_null() {
            return None;
        }
        // SAFETY: the head is a valid free page by the invariant.
        let next = unsafe { (*self.head).next };
        // SAFETY: ditto.
        Some(unsafe { Page::from_usize(mem::replace(&mut self.head, next) as usize) })
    }
}

/// Hand the arena to the allocator.
///
/// # Safety
///
/// Must be called only once, before any allocation.
pub unsafe fn kinit() {
    let mut kmem = KMEM.lock();
    // SAFETY: called once per boot.
    unsafe { kmem.init() };
}

/// Allocate one page, filled with junk.
pub fn kalloc() -> Option<Page> {
    let mut page = KMEM.lock().alloc()?;
    page.write_bytes(5);
    Some(page)
}

/// Return a page to the allocator.
pub fn kfree(mut page: Page) {
    // Fill with junk to catch dangling refs.
    page.write_bytes(1);
    KMEM.lock().free(page);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memlayout::PGSIZE;
    use crate::proc::test_util::setup;

    #[test]
    fn alloc_and_free_round_trip() {
        let _env = setup();
        let mut page = kalloc().expect("arena exhausted");
        page.write_bytes(0);
        page[0] = 0xa5;
        page[PGSIZE - 1] = 0x5a;
        assert_eq!(page[0], 0xa5);
        assert_eq!(page[PGSIZE - 1], 0x5a);
        kfree(page);
    }

    #[test]
    fn freed_page_is_reusable() {
        let _env = setup();
        let first = kalloc().expect("arena exhausted");
        let addr = first.addr();
        kfree(first);
        let second = kalloc().expect("arena exhausted");
        // LIFO free list hands the same page back.
        assert_eq!(second.addr(), addr);
        kfree(second);
    }
}
