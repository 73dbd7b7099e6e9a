//! RISC-V (Sv39, qemu `virt`) architecture support.

use core::arch::{asm, global_asm};
use core::ptr;

use super::interface::{ContextOps, TrapFrameOps};

/// Supervisor Interrupt Enable bit of sstatus.
const SSTATUS_SIE: usize = 1 << 1;

extern "C" {
    // trampoline.S
    static trampoline: [u8; 0];

    // trap.rs of the enclosing kernel
    fn usertrapret() -> !;
}

/// Saved registers for kernel context switches.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,

    /// Callee-saved
    pub s0: usize,
    pub s1: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
        }
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

/// Per-process data for the trap handling code in trampoline.S.
/// Sits in a page by itself just under the trampoline page in the
/// user page table. The sscratch register points here.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct TrapFrame {
    /// 0 - kernel page table
    pub kernel_satp: usize,
    /// 8 - top of process's kernel stack
    pub kernel_sp: usize,
    /// 16 - usertrap()
    pub kernel_trap: usize,
    /// 24 - saved user program counter
    pub epc: usize,
    /// 32 - saved kernel tp
    pub kernel_hartid: usize,
    /// 40
    pub ra: usize,
    /// 48
    pub sp: usize,
    /// 56
    pub gp: usize,
    /// 64
    pub tp: usize,
    /// 72
    pub t0: usize,
    /// 80
    pub t1: usize,
    /// 88
    pub t2: usize,
    /// 96
    pub s0: usize,
    /// 104
    pub s1: usize,
    /// 112
    pub a0: usize,
    /// 120
    pub a1: usize,
    /// 128
    pub a2: usize,
    /// 136
    pub a3: usize,
    /// 144
    pub a4: usize,
    /// 152
    pub a5: usize,
    /// 160
    pub a6: usize,
    /// 168
    pub a7: usize,
    /// 176
    pub s2: usize,
    /// 184
    pub s3: usize,
    /// 192
    pub s4: usize,
    /// 200
    pub s5: usize,
    /// 208
    pub s6: usize,
    /// 216
    pub s7: usize,
    /// 224
    pub s8: usize,
    /// 232
    pub s9: usize,
    /// 240
    pub s10: usize,
    /// 248
    pub s11: usize,
    /// 256
    pub t3: usize,
    /// 264
    pub t4: usize,
    /// 272
    pub t5: usize,
    /// 280
    pub t6: usize,
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

/// Which hart (core) is this? tp holds the hartid.
/// Must be called with interrupts disabled, to prevent a race with the
/// thread being moved to a different CPU.
pub fn cpu_id() -> usize {
    let id;
    unsafe { asm!("mv {0}, tp", out(reg) id) };
    id
}

/// Enable device interrupts.
///
/// # Safety
///
/// The interrupt vector must have been configured.
pub unsafe fn intr_on() {
    unsafe { asm!("csrs sstatus, {0}", in(reg) SSTATUS_SIE) };
}

/// Disable device interrupts.
pub fn intr_off() {
    unsafe { asm!("csrc sstatus, {0}", in(reg) SSTATUS_SIE) };
}

/// Are device interrupts enabled?
pub fn intr_get() -> bool {
    let x: usize;
    unsafe { asm!("csrr {0}, sstatus", out(reg) x) };
    x & SSTATUS_SIE != 0
}

pub fn trampoline_addr() -> usize {
    unsafe { ptr::addr_of!(trampoline) as usize }
}

/// Leave for user space; provided by the trap collaborator.
///
/// # Safety
///
/// The current process's trapframe must be set up for the return.
pub unsafe fn user_trap_ret() -> ! {
    unsafe { usertrapret() }
}

// Save current registers in old, load from new.
global_asm!(
    r#"
.globl swtch
.align 4
swtch:
        sd ra, 0(a0)
        sd sp, 8(a0)
        sd s0, 16(a0)
        sd s1, 24(a0)
        sd s2, 32(a0)
        sd s3, 40(a0)
        sd s4, 48(a0)
        sd s5, 56(a0)
        sd s6, 64(a0)
        sd s7, 72(a0)
        sd s8, 80(a0)
        sd s9, 88(a0)
        sd s10, 96(a0)
        sd s11, 104(a0)

        ld ra, 0(a1)
        ld sp, 8(a1)
        ld s0, 16(a1)
        ld s1, 24(a1)
        ld s2, 32(a1)
        ld s3, 40(a1)
        ld s4, 48(a1)
        ld s5, 56(a1)
        ld s6, 64(a1)
        ld s7, 72(a1)
        ld s8, 80(a1)
        ld s9, 88(a1)
        ld s10, 96(a1)
        ld s11, 104(a1)

        ret
"#
);

extern "C" {
    /// Switch kernel contexts.
    pub fn swtch(old: *mut Context, new: *mut Context);
}
