//! The kernel value: one static owning the subsystems this crate
//! provides.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::file::FileTable;
use crate::fs::FileSystem;
use crate::proc::Procs;

static KERNEL: Kernel = Kernel::new();

/// The kernel. Immutable access is always fine; everything mutable
/// inside is behind a lock or an atomic.
pub fn kernel() -> &'static Kernel {
    &KERNEL
}

pub struct Kernel {
    /// Timer ticks since boot, advanced by the timer interrupt path
    /// through `clock_tick`.
    ticks: AtomicU32,

    /// The process table.
    procs: Procs,

    /// Open-file table.
    ftable: FileTable,

    /// The slice of the file system the process core consumes.
    fs: FileSystem,
}

impl Kernel {
    const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
            procs: Procs::new(),
            ftable: FileTable::new(),
            fs: FileSystem::new(),
        }
    }

    /// Boot-time initialization: hand the arena to the page allocator
    /// and give every process slot its kernel stack.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, on the boot CPU, before the
    /// schedulers start.
    pub unsafe fn init(&self) {
        // SAFETY: called once per boot.
        unsafe { crate::kalloc::kinit() };
        // SAFETY: no process exists yet.
        unsafe { self.procs.init() };
    }

    pub fn procs(&self) -> &Procs {
        &self.procs
    }

    pub fn ftable(&self) -> &FileTable {
        &self.ftable
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    /// Ticks since boot.
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }

    /// The timer path calls this once per tick: advance the clock,
    /// then account the tick to every RUNNING process.
    pub fn clock_tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
        self.procs.update_time();
    }

    /// Print a process listing (^P). Takes no locks, so it cannot
    /// wedge a stuck machine further.
    pub fn dump<W: fmt::Write>(&self, w: &mut W) {
        self.procs.dump(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::test_util::{setup, spawn, tick};
    use crate::proc::Procstate;

    #[test]
    fn clock_tick_advances_time() {
        let _env = setup();
        let before = kernel().ticks();
        tick(3);
        assert_eq!(kernel().ticks(), before + 3);
    }

    #[test]
    fn clock_tick_charges_running_slots_only() {
        let _env = setup();
        let running = spawn("charged");
        let waiting = spawn("idle");
        running.lock().info_mut().state = Procstate::RUNNING;

        tick(5);

        assert_eq!(running.lock().info().rtime, 5);
        assert_eq!(waiting.lock().info().rtime, 0);
    }

    #[test]
    fn dump_lists_live_slots() {
        let _env = setup();
        let p = spawn("dumpling");
        let pid = p.lock().info().pid;

        let mut out = String::new();
        kernel().dump(&mut out);

        assert!(out.contains("dumpling") || out.contains(&pid.to_string()));
        assert!(out.contains(&pid.to_string()));
    }
}
