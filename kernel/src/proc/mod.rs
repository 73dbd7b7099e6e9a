//! Process slots and their guards.

use core::cell::UnsafeCell;
use core::mem::{self, MaybeUninit};
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch;
use crate::cpu::CPUS;
use crate::file::RcFile;
use crate::fs::RcInode;
use crate::kalloc::kfree;
use crate::lock::SpinLock;
use crate::page::Page;
use crate::param::{MAXPROCNAME, NOFILE};
use crate::sched::SchedInfo;
use crate::vm::UserMemory;

mod kernel_ctx;
mod procs;
mod wait_channel;

#[cfg(test)]
pub(crate) mod test_util;

pub use kernel_ctx::*;
pub use procs::*;
pub use wait_channel::*;

pub type Pid = i32;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Procstate {
    UNUSED,
    USED,
    SLEEPING,
    RUNNABLE,
    RUNNING,
    ZOMBIE,
}

impl Procstate {
    pub fn as_str(self) -> &'static str {
        match self {
            Procstate::UNUSED => "unused",
            Procstate::USED => "used  ",
            Procstate::SLEEPING => "sleep ",
            Procstate::RUNNABLE => "runble",
            Procstate::RUNNING => "run   ",
            Procstate::ZOMBIE => "zombie",
        }
    }
}

/// Fields protected by `Proc::info`'s spinlock.
pub struct ProcInfo {
    /// Process state.
    pub state: Procstate,

    /// If non-null, sleeping on this channel.
    pub chan: *const WaitChannel,

    /// Exit status to be returned to the parent's wait.
    pub xstate: i32,

    /// Process ID.
    pub pid: Pid,

    /// Tick the slot was allocated.
    pub ctime: u32,

    /// Tick the process exited; 0 until then.
    pub etime: u32,

    /// Ticks spent RUNNING.
    pub rtime: u32,

    /// Scheduling-policy bookkeeping.
    pub sched: SchedInfo,
}

/// Fields private to the process; no lock needed.
pub struct ProcData {
    /// Bottom of this process's kernel stack.
    pub kstack: usize,

    /// Trapframe page.
    pub trap_frame: *mut arch::TrapFrame,

    /// User address space.
    pub memory: MaybeUninit<UserMemory>,

    /// swtch() here to run the process.
    pub context: arch::Context,

    /// Open files.
    pub open_files: [Option<RcFile>; NOFILE],

    /// Current directory.
    pub cwd: MaybeUninit<RcInode>,

    /// Process name (debugging).
    pub name: [u8; MAXPROCNAME],
}

impl ProcData {
    const fn new() -> Self {
        Self {
            kstack: 0,
            trap_frame: ptr::null_mut(),
            memory: MaybeUninit::uninit(),
            context: arch::Context::new(),
            open_files: [const { None }; NOFILE],
            cwd: MaybeUninit::uninit(),
            name: [0; MAXPROCNAME],
        }
    }
}

/// Per-process state.
///
/// # Safety
///
/// * If `info.state` ≠ `UNUSED`, then `data.trap_frame` points to a
///   live page and `data.memory` has been initialized.
/// * If `info.state` ∉ { `UNUSED`, `USED` }, then `data.cwd` has been
///   initialized.
pub struct Proc {
    pub info: SpinLock<ProcInfo>,

    data: UnsafeCell<ProcData>,

    /// Parent process; guarded by `Procs::wait_lock`, not `info`.
    pub(crate) parent: WaitCell<*const Proc>,

    /// The channel this process sleeps on in `wait`; its children's
    /// `exit` broadcasts here.
    pub child_chan: WaitChannel,

    /// True when the process has been killed.
    killed: AtomicBool,
}

// SAFETY: `info` is lock-protected, `parent` is wait_lock-protected,
// `data` is only touched by the process itself or under `info` while
// the slot cannot be running.
unsafe impl Sync for Proc {}

impl Proc {
    pub(crate) const fn new() -> Self {
        Self {
            info: SpinLock::new(
                "proc",
                ProcInfo {
                    state: Procstate::UNUSED,
                    chan: ptr::null(),
                    xstate: 0,
                    pid: 0,
                    ctime: 0,
                    etime: 0,
                    rtime: 0,
                    sched: SchedInfo::new(),
                },
            ),
            data: UnsafeCell::new(ProcData::new()),
            parent: WaitCell::new(ptr::null()),
            child_chan: WaitChannel::new(),
            killed: AtomicBool::new(false),
        }
    }

    /// Acquire the slot's lock.
    pub fn lock(&self) -> ProcGuard<'_> {
        mem::forget(self.info.lock());
        ProcGuard { proc: self }
    }

    /// Mark the process killed. It exits when it next crosses back to
    /// user space.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    pub(crate) fn data_raw(&self) -> *mut ProcData {
        self.data.get()
    }
}

/// A cell whose contents the table's single `wait_lock` protects.
///
/// This is a remote lock cut down to one use: `parent` pointers are
/// read and written only while `wait_lock` is held, never under the
/// slot's own lock, which is what lets `wait` scan parents without
/// taking every slot lock first.
pub struct WaitCell<T>(UnsafeCell<T>);

// SAFETY: access goes through `get_mut`, which requires the wait_lock
// guard.
unsafe impl<T> Sync for WaitCell<T> {}

impl<T> WaitCell<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Borrow the contents. `guard` must be the guard of the process
    /// table's `wait_lock`; borrowing it mutably keeps the access
    /// exclusive.
    pub(crate) fn get_mut<'a>(&'a self, guard: &'a mut WaitGuard<'_>) -> &'a mut T {
        let _ = guard;
        // SAFETY: wait_lock is held and `guard` is mutably borrowed for
        // as long as the reference lives.
        unsafe { &mut *self.0.get() }
    }
}

/// Proof that a slot's `info` lock is held.
pub struct ProcGuard<'s> {
    proc: &'s Proc,
}

impl<'s> ProcGuard<'s> {
    pub fn info(&self) -> &ProcInfo {
        // SAFETY: `info` is locked.
        unsafe { &*self.proc.info.get_mut_raw() }
    }

    pub fn info_mut(&mut self) -> &mut ProcInfo {
        // SAFETY: `info` is locked and `&mut self` is exclusive.
        unsafe { &mut *self.proc.info.get_mut_raw() }
    }

    pub fn state(&self) -> Procstate {
        self.info().state
    }

    pub fn proc(&self) -> &'s Proc {
        self.proc
    }

    /// Mutable access to the slot's private data.
    ///
    /// # Safety
    ///
    /// The slot must not be any CPU's current process: a running
    /// process reaches its `ProcData` without this lock.
    pub unsafe fn data_mut(&mut self) -> &mut ProcData {
        // SAFETY: per the caller's obligation there is no concurrent
        // access through `CurrentProc`.
        unsafe { &mut *self.proc.data.get() }
    }

    pub(crate) fn context_raw(&mut self) -> *mut arch::Context {
        // A raw pointer is enough for swtch; no reference escapes.
        unsafe { ptr::addr_of_mut!((*self.proc.data.get()).context) }
    }

    /// Switch to the scheduler. Must hold only this lock and have
    /// already changed `state`. Saves and restores `interrupt_enabled`
    /// because it is a property of this kernel thread, not this CPU.
    ///
    /// # Safety
    ///
    /// The per-CPU scheduler context must be live, i.e. this is called
    /// from a process that was dispatched by `scheduler()`.
    pub unsafe fn sched(&mut self) {
        assert!(!arch::intr_get(), "sched interruptible");
        assert_ne!(self.state(), Procstate::RUNNING, "sched running");

        let cpu = CPUS.current();
        // SAFETY: interrupts are off.
        assert_eq!(unsafe { (*cpu).noff() }, 1, "sched locks");

        let intena = unsafe { (*cpu).interrupt_enabled() };
        let context = self.context_raw();
        // SAFETY: both contexts are live for the duration of the switch.
        unsafe { arch::swtch(context, ptr::addr_of_mut!((*cpu).context)) };

        // swtch may have moved this thread to another CPU.
        let cpu = CPUS.current();
        // SAFETY: interrupts are still off.
        unsafe { (*cpu).set_interrupt(intena) };
    }

    /// Free the slot and everything hanging off it, including user
    /// pages, and clear the parent pointer. Used by `wait` to reap a
    /// zombie and by `fork` to roll back a failed allocation.
    ///
    /// # Safety
    ///
    /// `state` ≠ `UNUSED`, and the slot is not any CPU's current
    /// process.
    pub unsafe fn clear(&mut self, parent_guard: &mut WaitGuard<'_>) {
        // SAFETY: the slot is not running, per the caller's obligation.
        let data = unsafe { self.data_mut() };
        let trap_frame = mem::replace(&mut data.trap_frame, ptr::null_mut());
        // SAFETY: `trap_frame` uniquely refers to a live page (slot
        // invariant for state ≠ UNUSED).
        kfree(unsafe { Page::from_usize(trap_frame as usize) });
        // SAFETY: `memory` is initialized (slot invariant); replacing
        // with uninit is fine because state becomes UNUSED below.
        unsafe {
            mem::replace(&mut data.memory, MaybeUninit::uninit())
                .assume_init()
                .free()
        };
        data.name[0] = 0;

        *self.proc.parent.get_mut(parent_guard) = ptr::null();

        let info = self.info_mut();
        info.chan = ptr::null();
        info.pid = 0;
        info.xstate = 0;
        info.ctime = 0;
        info.etime = 0;
        info.rtime = 0;
        info.sched = SchedInfo::new();
        info.state = Procstate::UNUSED;

        self.proc.killed.store(false, Ordering::Release);
    }

    /// SLEEPING → RUNNABLE, clearing the channel and letting the
    /// active policy account for the wake. No-op otherwise.
    pub(crate) fn wake(&mut self, now: u32) {
        if self.state() == Procstate::SLEEPING {
            let info = self.info_mut();
            info.chan = ptr::null();
            info.state = Procstate::RUNNABLE;
            crate::sched::on_wake(&mut info.sched, now);
        }
    }

    /// Temporarily release the lock, call `f` on the bare slot, and
    /// reacquire. Needed where the lock order demands a flip.
    pub fn reacquire_after<F, U>(&mut self, f: F) -> U
    where
        F: FnOnce(&Proc) -> U,
    {
        // SAFETY: the release is temporary; `self` cannot be used as a
        // guard inside `f`.
        unsafe { self.proc.info.unlock() };
        let result = f(self.proc);
        mem::forget(self.proc.info.lock());
        result
    }
}

impl Drop for ProcGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard goes away with the release.
        unsafe { self.proc.info.unlock() };
    }
}
