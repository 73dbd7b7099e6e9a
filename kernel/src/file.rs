//! Open files.
//!
//! The real file layer lives outside the process core; what fork and
//! exit need from it is reference counting. The table below carries
//! exactly that: `dup` is the `filedup` the core consumes, `close` is
//! `fileclose`. An [`RcFile`] is a handle that can only be duplicated
//! or retired through the table.

use crate::lock::SpinLock;
use crate::param::NFILE;

#[derive(Copy, Clone)]
struct FileSlot {
    nref: u32,
}

pub struct FileTable {
    slots: SpinLock<[FileSlot; NFILE]>,
}

/// Handle to an open file.
pub struct RcFile {
    idx: usize,
}

impl FileTable {
    pub const fn new() -> Self {
        Self {
            slots: SpinLock::new("ftable", [FileSlot { nref: 0 }; NFILE]),
        }
    }

    /// Allocate a file structure.
    pub fn alloc(&self) -> Option<RcFile> {
        let mut slots = self.slots.lock();
        for (idx, slot) in slots.iter_mut().enumerate() {
            if slot.nref == 0 {
                slot.nref = 1;
                return Some(RcFile { idx });
            }
        }
        None
    }

    /// Increment the reference count on `file` (filedup).
    pub fn dup(&self, file: &RcFile) -> RcFile {
        let mut slots = self.slots.lock();
        assert!(slots[file.idx].nref >= 1, "filedup");
        slots[file.idx].nref += 1;
        RcFile { idx: file.idx }
    }

    /// Drop a reference to `file` (fileclose).
    pub fn close(&self, file: RcFile) {
        let mut slots = self.slots.lock();
        assert!(slots[file.idx].nref >= 1, "fileclose");
        slots[file.idx].nref -= 1;
    }

    pub fn nref(&self, file: &RcFile) -> u32 {
        self.slots.lock()[file.idx].nref
    }
}
