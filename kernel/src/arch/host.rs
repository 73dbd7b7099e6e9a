//! Single-hart simulator arch.
//!
//! Linked on every target that is not bare-metal riscv64, which is how
//! the process table and the scheduling policies get exercised by unit
//! tests on the development machine. The interrupt flag is software
//! state; context switching and user mode do not exist here, so
//! [`swtch`] and [`user_trap_ret`] refuse to run.

use core::sync::atomic::{AtomicBool, Ordering};

use super::interface::{ContextOps, TrapFrameOps};
use crate::page::RawPage;

/// Device-interrupt flag of the one simulated hart.
static INTR_ENABLED: AtomicBool = AtomicBool::new(false);

/// Stands in for the trampoline page of trampoline.S.
static TRAMPOLINE_PAGE: RawPage = RawPage::DEFAULT;

/// Saved registers for kernel context switches.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,
}

impl Context {
    pub const fn new() -> Self {
        Self { ra: 0, sp: 0 }
    }
}

impl ContextOps for Context {
    fn set_ret_addr(&mut self, ra: usize) {
        self.ra = ra;
    }

    fn set_stack_ptr(&mut self, sp: usize) {
        self.sp = sp;
    }
}

/// The slice of the register file the core reads and writes.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct TrapFrame {
    /// Saved user program counter.
    pub epc: usize,
    /// Saved user stack pointer.
    pub sp: usize,
    /// Return-value / first-argument register.
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub ra: usize,
}

impl TrapFrameOps for TrapFrame {
    fn set_pc(&mut self, pc: usize) {
        self.epc = pc;
    }

    fn pc(&self) -> usize {
        self.epc
    }

    fn set_stack_ptr(&mut self, sp: usize) {
        self.sp = sp;
    }

    fn stack_ptr(&self) -> usize {
        self.sp
    }

    fn set_ret_val(&mut self, val: usize) {
        self.a0 = val;
    }

    fn ret_val(&self) -> usize {
        self.a0
    }
}

/// The simulator has exactly one hart.
pub fn cpu_id() -> usize {
    0
}

/// Enable device interrupts.
///
/// # Safety
///
/// Trivially safe here; unsafe to match the hardware arch.
pub unsafe fn intr_on() {
    INTR_ENABLED.store(true, Ordering::Release);
}

/// Disable device interrupts.
pub fn intr_off() {
    INTR_ENABLED.store(false, Ordering::Release);
}

/// Are device interrupts enabled?
pub fn intr_get() -> bool {
    INTR_ENABLED.load(Ordering::Acquire)
}

pub fn trampoline_addr() -> usize {
    &TRAMPOLINE_PAGE as *const RawPage as usize
}

/// Switch kernel contexts.
///
/// # Safety
///
/// Never safe here: the simulator has one stack per thread and cannot
/// trade them.
pub unsafe fn swtch(_old: *mut Context, _new: *mut Context) {
    panic!("swtch: the simulator arch cannot switch kernel contexts");
}

/// Leave for user space.
///
/// # Safety
///
/// Never safe here: the simulator has no user mode.
pub unsafe fn user_trap_ret() -> ! {
    panic!("user_trap_ret: the simulator arch has no user mode");
}
