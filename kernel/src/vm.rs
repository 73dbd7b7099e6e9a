//! User address spaces.
//!
//! The hardware page table belongs to the virtual-memory collaborator;
//! what the process core needs from it is an owned address space it can
//! seed, grow, shrink, deep-copy for fork, and copy bytes across. A
//! [`UserMemory`] renders that contract in software: page `i` of the
//! list backs virtual addresses `i*PGSIZE..(i+1)*PGSIZE`, and the
//! trampoline/trapframe mappings every process carries are recorded
//! with their permission bits.

use core::cmp;
use core::mem;
use core::slice;

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::kalloc::{kalloc, kfree};
use crate::memlayout::{PGSIZE, TRAMPOLINE, TRAPFRAME};
use crate::page::Page;
use crate::param::USERPAGES;

bitflags! {
    /// Page-table entry permission bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PtePerm: u8 {
        /// Readable.
        const R = 1 << 1;
        /// Writable.
        const W = 1 << 2;
        /// Executable.
        const X = 1 << 3;
        /// User-accessible.
        const U = 1 << 4;
    }
}

/// A user virtual address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UVAddr(usize);

impl UVAddr {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub fn into_usize(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A fixed mapping installed in every user address space.
#[derive(Clone, Copy)]
struct SpecialMapping {
    va: usize,
    pa: usize,
    perm: PtePerm,
}

/// One process's user memory.
pub struct UserMemory {
    /// Page `i` backs virtual addresses `i*PGSIZE..(i+1)*PGSIZE`.
    pages: ArrayVec<Page, USERPAGES>,
    /// The trampoline and trapframe mappings; not user-accessible.
    special: [SpecialMapping; 2],
    /// Bytes of user memory in use.
    sz: usize,
}

impl UserMemory {
    /// Create an address space mapping the trampoline (read+execute)
    /// and the given trapframe page (read+write), optionally seeded
    /// with one user page holding `initcode`. Returns `None` if a page
    /// cannot be allocated.
    pub fn new(trapframe_pa: usize, initcode: Option<&[u8]>) -> Option<Self> {
        let special = [
            SpecialMapping {
                va: TRAMPOLINE,
                pa: crate::arch::trampoline_addr(),
                perm: PtePerm::R.union(PtePerm::X),
            },
            SpecialMapping {
                va: TRAPFRAME,
                pa: trapframe_pa,
                perm: PtePerm::R.union(PtePerm::W),
            },
        ];
        let mut memory = Self {
            pages: ArrayVec::new(),
            special,
            sz: 0,
        };
        if let Some(code) = initcode {
            assert!(code.len() <= PGSIZE, "new: more than a page");
            let mut page = kalloc()?;
            page.write_bytes(0);
            page[..code.len()].copy_from_slice(code);
            memory.pages.push(page);
            memory.sz = PGSIZE;
        }
        Some(memory)
    }

    /// Bytes of user memory in use.
    pub fn size(&self) -> usize {
        self.sz
    }

    pub fn trapframe_mapping(&self) -> (usize, usize, PtePerm) {
        let m = &self.special[1];
        (m.va, m.pa, m.perm)
    }

    pub fn trampoline_mapping(&self) -> (usize, usize, PtePerm) {
        let m = &self.special[0];
        (m.va, m.pa, m.perm)
    }

    /// Grow to `newsz` bytes, zeroing the fresh pages. On failure the
    /// size is left unchanged and `Err` is returned.
    pub fn alloc(&mut self, newsz: usize) -> Result<usize, ()> {
        if newsz <= self.sz {
            return Ok(self.sz);
        }
        if newsz > USERPAGES * PGSIZE {
            return Err(());
        }
        let keep = (self.sz + PGSIZE - 1) / PGSIZE;
        while self.pages.len() * PGSIZE < newsz {
            let mut page = match kalloc() {
                Some(page) => page,
                None => {
                    // Roll the partial growth back.
                    while self.pages.len() > keep {
                        if let Some(page) = self.pages.pop() {
                            kfree(page);
                        }
                    }
                    return Err(());
                }
            };
            page.write_bytes(0);
            self.pages.push(page);
        }
        self.sz = newsz;
        Ok(newsz)
    }

    /// Shrink to `newsz` bytes. Always succeeds.
    pub fn dealloc(&mut self, newsz: usize) -> usize {
        if newsz >= self.sz {
            return self.sz;
        }
        let keep = (newsz + PGSIZE - 1) / PGSIZE;
        while self.pages.len() > keep {
            if let Some(page) = self.pages.pop() {
                kfree(page);
            }
        }
        self.sz = newsz;
        newsz
    }

    /// Deep copy for fork. The child records its own trapframe page.
    pub fn try_clone(&self, trapframe_pa: usize) -> Option<Self> {
        let mut new = Self::new(trapframe_pa, None)?;
        for page in &self.pages {
            let mut copy = match kalloc() {
                Some(page) => page,
                None => {
                    new.free();
                    return None;
                }
            };
            copy[..].copy_from_slice(&page[..]);
            new.pages.push(copy);
        }
        new.sz = self.sz;
        Some(new)
    }

    /// Copy `src` to user address `dst`.
    pub fn copy_out_bytes(&mut self, dst: UVAddr, src: &[u8]) -> Result<(), ()> {
        let mut va = dst.into_usize();
        let end = va.checked_add(src.len()).ok_or(())?;
        if end > self.sz {
            return Err(());
        }
        let mut src = src;
        while !src.is_empty() {
            let off = va % PGSIZE;
            let n = cmp::min(PGSIZE - off, src.len());
            let page = self.pages.get_mut(va / PGSIZE).ok_or(())?;
            page[off..off + n].copy_from_slice(&src[..n]);
            src = &src[n..];
            va += n;
        }
        Ok(())
    }

    /// Copy a sized value out to user address `dst`.
    pub fn copy_out<T>(&mut self, dst: UVAddr, val: &T) -> Result<(), ()> {
        // SAFETY: any T is read as plain bytes for a user copy.
        let bytes =
            unsafe { slice::from_raw_parts(val as *const T as *const u8, mem::size_of::<T>()) };
        self.copy_out_bytes(dst, bytes)
    }

    /// Copy from user address `src` into `dst`.
    pub fn copy_in_bytes(&self, dst: &mut [u8], src: UVAddr) -> Result<(), ()> {
        let mut va = src.into_usize();
        let end = va.checked_add(dst.len()).ok_or(())?;
        if end > self.sz {
            return Err(());
        }
        let mut dst = dst;
        while !dst.is_empty() {
            let off = va % PGSIZE;
            let n = cmp::min(PGSIZE - off, dst.len());
            let page = self.pages.get(va / PGSIZE).ok_or(())?;
            dst[..n].copy_from_slice(&page[off..off + n]);
            dst = &mut dst[n..];
            va += n;
        }
        Ok(())
    }

    /// Return every page to the allocator.
    pub fn free(mut self) {
        while let Some(page) = self.pages.pop() {
            kfree(page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::test_util::setup;

    fn fresh(initcode: Option<&[u8]>) -> (UserMemory, Page) {
        let trapframe = kalloc().expect("arena exhausted");
        let memory = UserMemory::new(trapframe.addr(), initcode).expect("arena exhausted");
        (memory, trapframe)
    }

    #[test]
    fn initcode_seeds_one_page() {
        let _env = setup();
        let code = [0x17u8, 0x05, 0x00, 0x00];
        let (memory, trapframe) = fresh(Some(&code));
        assert_eq!(memory.size(), PGSIZE);
        let mut back = [0u8; 4];
        memory.copy_in_bytes(&mut back, UVAddr::new(0)).unwrap();
        assert_eq!(back, code);
        memory.free();
        kfree(trapframe);
    }

    #[test]
    fn special_mappings_carry_perms() {
        let _env = setup();
        let (memory, trapframe) = fresh(None);
        let (va, pa, perm) = memory.trapframe_mapping();
        assert_eq!(va, TRAPFRAME);
        assert_eq!(pa, trapframe.addr());
        assert_eq!(perm, PtePerm::R | PtePerm::W);
        let (va, _, perm) = memory.trampoline_mapping();
        assert_eq!(va, TRAMPOLINE);
        assert_eq!(perm, PtePerm::R | PtePerm::X);
        memory.free();
        kfree(trapframe);
    }

    #[test]
    fn alloc_then_dealloc() {
        let _env = setup();
        let (mut memory, trapframe) = fresh(None);
        assert_eq!(memory.alloc(3 * PGSIZE + 1), Ok(3 * PGSIZE + 1));
        assert_eq!(memory.size(), 3 * PGSIZE + 1);
        // Shrinking always succeeds.
        assert_eq!(memory.dealloc(PGSIZE), PGSIZE);
        assert_eq!(memory.size(), PGSIZE);
        memory.free();
        kfree(trapframe);
    }

    #[test]
    fn alloc_beyond_limit_fails() {
        let _env = setup();
        let (mut memory, trapframe) = fresh(None);
        assert_eq!(memory.alloc((USERPAGES + 1) * PGSIZE), Err(()));
        assert_eq!(memory.size(), 0);
        memory.free();
        kfree(trapframe);
    }

    #[test]
    fn clone_is_deep() {
        let _env = setup();
        let (mut memory, trapframe) = fresh(Some(&[1, 2, 3]));
        let child_tf = kalloc().expect("arena exhausted");
        let mut child = memory.try_clone(child_tf.addr()).expect("arena exhausted");
        assert_eq!(child.size(), memory.size());

        // Writes to the child are invisible to the parent.
        child.copy_out_bytes(UVAddr::new(0), &[9, 9, 9]).unwrap();
        let mut parent_bytes = [0u8; 3];
        memory
            .copy_in_bytes(&mut parent_bytes, UVAddr::new(0))
            .unwrap();
        assert_eq!(parent_bytes, [1, 2, 3]);

        child.free();
        kfree(child_tf);
        memory.free();
        kfree(trapframe);
    }

    #[test]
    fn copy_crosses_page_boundary() {
        let _env = setup();
        let (mut memory, trapframe) = fresh(None);
        memory.alloc(2 * PGSIZE).unwrap();
        let data = [7u8; 64];
        let addr = UVAddr::new(PGSIZE - 32);
        memory.copy_out_bytes(addr, &data).unwrap();
        let mut back = [0u8; 64];
        memory.copy_in_bytes(&mut back, addr).unwrap();
        assert_eq!(back, data);
        memory.free();
        kfree(trapframe);
    }

    #[test]
    fn out_of_bounds_copy_fails() {
        let _env = setup();
        let (mut memory, trapframe) = fresh(Some(&[0]));
        assert!(memory
            .copy_out_bytes(UVAddr::new(PGSIZE - 2), &[1, 2, 3])
            .is_err());
        memory.free();
        kfree(trapframe);
    }
}
