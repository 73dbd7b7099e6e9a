//! The slice of the file system the process core consumes: a
//! reference-counted inode table (`namei`, `idup`, `iput`), the
//! transaction brackets `exit` wraps its cwd release in, and the
//! one-shot initialization `forkret` performs.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::lock::SpinLock;
use crate::param::NINODE;

#[derive(Copy, Clone)]
struct InodeSlot {
    nref: u32,
}

pub struct ITable {
    slots: SpinLock<[InodeSlot; NINODE]>,
}

/// Handle to an in-memory inode.
pub struct RcInode {
    idx: usize,
}

impl ITable {
    const fn new() -> Self {
        Self {
            slots: SpinLock::new("itable", [InodeSlot { nref: 0 }; NINODE]),
        }
    }

    /// Look up a path. Only the root is resolvable here; everything
    /// else belongs to the external file system.
    pub fn namei(&self, path: &str) -> Result<RcInode, ()> {
        if path != "/" {
            return Err(());
        }
        let mut slots = self.slots.lock();
        slots[0].nref += 1;
        Ok(RcInode { idx: 0 })
    }

    /// Increment the reference count on `ip` (idup).
    pub fn dup(&self, ip: &RcInode) -> RcInode {
        let mut slots = self.slots.lock();
        assert!(slots[ip.idx].nref >= 1, "idup");
        slots[ip.idx].nref += 1;
        RcInode { idx: ip.idx }
    }

    /// Drop a reference to `ip` (iput).
    pub fn put(&self, ip: RcInode) {
        let mut slots = self.slots.lock();
        assert!(slots[ip.idx].nref >= 1, "iput");
        slots[ip.idx].nref -= 1;
    }

    pub fn nref(&self, ip: &RcInode) -> u32 {
        self.slots.lock()[ip.idx].nref
    }
}

/// An ongoing file-system operation (begin_op/end_op).
pub struct FsTransaction<'s> {
    fs: &'s FileSystem,
}

impl FsTransaction<'_> {
    pub fn end(self) {}
}

impl Drop for FsTransaction<'_> {
    fn drop(&mut self) {
        self.fs.active_txs.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct FileSystem {
    itable: ITable,
    initialized: AtomicBool,
    active_txs: AtomicU32,
}

impl FileSystem {
    pub const fn new() -> Self {
        Self {
            itable: ITable::new(),
            initialized: AtomicBool::new(false),
            active_txs: AtomicU32::new(0),
        }
    }

    /// One-time initialization, run from the first `forkret` because it
    /// must happen in a process context.
    pub fn init(&self, _dev: u32) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Begin a file-system operation.
    pub fn begin_tx(&self) -> FsTransaction<'_> {
        self.active_txs.fetch_add(1, Ordering::AcqRel);
        FsTransaction { fs: self }
    }

    pub fn active_txs(&self) -> u32 {
        self.active_txs.load(Ordering::Acquire)
    }

    pub fn itable(&self) -> &ITable {
        &self.itable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::kernel;
    use crate::proc::test_util::setup;

    #[test]
    fn namei_resolves_only_root() {
        let _env = setup();
        let itable = kernel().fs().itable();
        let root = itable.namei("/").unwrap();
        assert!(itable.nref(&root) >= 1);
        assert!(itable.namei("/etc").is_err());
        itable.put(root);
    }

    #[test]
    fn dup_put_balance() {
        let _env = setup();
        let itable = kernel().fs().itable();
        let root = itable.namei("/").unwrap();
        let before = itable.nref(&root);
        let second = itable.dup(&root);
        assert_eq!(itable.nref(&root), before + 1);
        itable.put(second);
        assert_eq!(itable.nref(&root), before);
        itable.put(root);
    }

    #[test]
    fn transactions_nest_and_close() {
        let _env = setup();
        let fs = kernel().fs();
        let base = fs.active_txs();
        let tx = fs.begin_tx();
        let tx2 = fs.begin_tx();
        assert_eq!(fs.active_txs(), base + 2);
        tx2.end();
        drop(tx);
        assert_eq!(fs.active_txs(), base);
    }
}
