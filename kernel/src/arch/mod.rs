//! Architecture layer.
//!
//! Every arch module exports the same surface: the [`Context`] and
//! [`TrapFrame`] types, `cpu_id`, the interrupt flag accessors, the
//! `swtch` context-switch leaf, `trampoline_addr` and `user_trap_ret`.
//! Which module is linked is decided at build time, so the rest of the
//! kernel refers to the items below without generics.

pub mod interface;

use interface::{ContextOps, TrapFrameOps};
use static_assertions::{assert_impl_all, const_assert};

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "riscv64", not(test)))] {
        mod riscv;
        pub use riscv::{
            cpu_id, intr_get, intr_off, intr_on, swtch, trampoline_addr, user_trap_ret, Context,
            TrapFrame,
        };
    } else {
        mod host;
        pub use host::{
            cpu_id, intr_get, intr_off, intr_on, swtch, trampoline_addr, user_trap_ret, Context,
            TrapFrame,
        };
    }
}

assert_impl_all!(Context: ContextOps);
assert_impl_all!(TrapFrame: TrapFrameOps);

// The trapframe lives alone in one page.
const_assert!(core::mem::size_of::<TrapFrame>() <= crate::memlayout::PGSIZE);
