//! Per-CPU state.

use core::cell::UnsafeCell;
use core::ptr;

use crate::arch;
use crate::param::NCPU;
use crate::proc::Proc;

pub static CPUS: Cpus = Cpus::new();

// The `Cpu` struct of the current CPU can be mutated. To do so, we
// need mutable pointers to `Cpu`s from a shared reference of `Cpus`,
// hence the `UnsafeCell`.
pub struct Cpus([UnsafeCell<Cpu>; NCPU]);

// SAFETY: each thread accesses only the cpu struct of the CPU it runs on.
unsafe impl Sync for Cpus {}

impl Cpus {
    const fn new() -> Self {
        Self([const { UnsafeCell::new(Cpu::new()) }; NCPU])
    }

    /// Return this CPU's cpu struct.
    ///
    /// It is safe to call this with interrupts enabled, but the
    /// returned address may no longer be the current CPU, since the
    /// scheduler can move the thread on a timer interrupt.
    pub fn current(&self) -> *mut Cpu {
        let id = cpuid();
        self.0[id].get()
    }

    /// push_off/pop_off are like intr_off()/intr_on() except that they
    /// are matched: it takes two pop_off()s to undo two push_off()s.
    /// Also, if interrupts are initially off, then push_off, pop_off
    /// leaves them off.
    ///
    /// # Safety
    ///
    /// Must be balanced by a later `pop_off` on the same CPU.
    pub unsafe fn push_off(&self) {
        let old = arch::intr_get();
        arch::intr_off();
        // SAFETY: interrupts are off, so the thread stays on this CPU.
        unsafe { (*self.current()).push_off(old) };
    }

    /// # Safety
    ///
    /// Must be paired with an earlier `push_off` on the same CPU.
    pub unsafe fn pop_off(&self) {
        assert!(!arch::intr_get(), "pop_off - interruptible");
        // SAFETY: interrupts are off, so the thread stays on this CPU.
        unsafe { (*self.current()).pop_off() };
    }

    /// Return the current CPU's running process, or null if none.
    pub fn current_proc(&self) -> *const Proc {
        // SAFETY: balanced below.
        unsafe { self.push_off() };
        // SAFETY: interrupts are off.
        let p = unsafe { (*self.current()).proc() };
        unsafe { self.pop_off() };
        p
    }
}

/// Per-CPU state.
pub struct Cpu {
    /// The process running on this cpu, or null.
    proc: *const Proc,

    /// swtch() here to enter scheduler().
    pub context: arch::Context,

    /// Depth of push_off() nesting.
    noff: i32,

    /// Were interrupts enabled before push_off()?
    interrupt_enabled: bool,
}

impl Cpu {
    const fn new() -> Self {
        Self {
            proc: ptr::null(),
            context: arch::Context::new(),
            noff: 0,
            interrupt_enabled: false,
        }
    }

    unsafe fn push_off(&mut self, old: bool) {
        if self.noff == 0 {
            self.interrupt_enabled = old;
        }
        self.noff += 1;
    }

    unsafe fn pop_off(&mut self) {
        assert!(self.noff >= 1, "pop_off");
        self.noff -= 1;
        if self.noff == 0 && self.interrupt_enabled {
            // SAFETY: the outermost critical section just ended.
            unsafe { arch::intr_on() };
        }
    }

    pub fn proc(&self) -> *const Proc {
        self.proc
    }

    pub fn set_proc(&mut self, p: *const Proc) {
        self.proc = p;
    }

    pub fn noff(&self) -> i32 {
        self.noff
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.interrupt_enabled
    }

    pub fn set_interrupt(&mut self, enabled: bool) {
        self.interrupt_enabled = enabled;
    }
}

/// Return this CPU's ID.
///
/// Must be called with interrupts disabled, to prevent a race with the
/// thread being moved to a different CPU.
pub fn cpuid() -> usize {
    arch::cpu_id()
}
