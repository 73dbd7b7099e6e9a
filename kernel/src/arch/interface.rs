//! What the process core asks of an architecture.
//!
//! Besides the two register-file types below, an arch module provides:
//!
//! * `cpu_id() -> usize`: which hart is this? Must be called with
//!   interrupts disabled, or the thread may migrate mid-read.
//! * `intr_on` / `intr_off` / `intr_get`: the device-interrupt flag.
//! * `swtch(old, new)`: save callee-saved registers into `old`,
//!   restore them from `new`. The two stacks trade places.
//! * `trampoline_addr()`: physical address of the trampoline page.
//! * `user_trap_ret() -> !`: leave the kernel for user space; owned
//!   by the trap collaborator.

/// Saved callee registers for kernel context switches.
pub trait ContextOps: Copy {
    /// Where `swtch` returns to.
    fn set_ret_addr(&mut self, ra: usize);
    /// The kernel stack the context runs on.
    fn set_stack_ptr(&mut self, sp: usize);
}

/// Per-process registers saved at the user/kernel boundary.
pub trait TrapFrameOps: Copy {
    fn set_pc(&mut self, pc: usize);
    fn pc(&self) -> usize;
    fn set_stack_ptr(&mut self, sp: usize);
    fn stack_ptr(&self) -> usize;
    /// The register a system call's result lands in.
    fn set_ret_val(&mut self, val: usize);
    fn ret_val(&self) -> usize;
}
