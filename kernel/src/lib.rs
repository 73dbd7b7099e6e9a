//! procyon: the process subsystem and scheduler core of a teaching
//! kernel for 64-bit RISC-V.
//!
//! The crate owns the fixed-size process table, the process lifecycle
//! (allocation, fork, exit, reap, kill), the sleep/wakeup primitive,
//! and four build-time-selectable scheduling policies (round robin,
//! FCFS, PBS, MLFQ). Virtual memory, the file system, the trap path
//! and the console are external collaborators; the thin stand-ins in
//! [`kalloc`], [`vm`], [`file`] and [`fs`] carry exactly the interface
//! the core consumes.
//!
//! On `riscv64` the architecture layer uses real CSR accesses and the
//! classic callee-saved-register `swtch`. On every other target a
//! single-hart simulator arch is linked instead, which is what lets
//! the table, the lifecycle and the policies be tested on the host.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
#![allow(dead_code)]

mod arch;
mod cpu;
mod file;
mod fs;
mod kalloc;
mod kernel;
mod lock;
mod memlayout;
mod page;
mod param;
mod proc;
pub mod sched;
mod vm;

pub use arch::interface::{ContextOps, TrapFrameOps};
pub use arch::{Context, TrapFrame};
pub use cpu::{cpuid, Cpu, Cpus, CPUS};
pub use file::{FileTable, RcFile};
pub use fs::{FileSystem, FsTransaction, ITable, RcInode};
pub use kernel::{kernel, Kernel};
pub use lock::{SpinLock, SpinLockGuard};
pub use page::Page;
pub use param::{NCPU, NOFILE, NPROC};
pub use proc::{
    current_ctx, CopySource, CopyTarget, CurrentProc, KernelCtx, Pid, Proc, ProcGuard, ProcInfo,
    Procs, Procstate, WaitChannel, WaitGuard,
};
pub use sched::{scheduler, set_priority, SchedInfo};
pub use vm::{PtePerm, UVAddr, UserMemory};
