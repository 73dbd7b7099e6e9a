//! CPU scheduling.
//!
//! Exactly one policy's `scheduler()` is linked per build, selected by
//! cargo feature: `fcfs`, `pbs`, `mlfq`, or round robin when none is
//! set. Every policy follows the same dispatch invariant: the chosen
//! slot's lock is held across `state = RUNNING`, the CPU's proc
//! assignment, `swtch`, and the release on the way back.
//!
//! Policy bookkeeping lives in one [`SchedInfo`] per slot regardless of
//! the linked policy; only the linked policy's fields are meaningful.

use core::fmt;
use core::ptr;

use cfg_if::cfg_if;

use crate::arch;
use crate::cpu::Cpu;
use crate::kernel::kernel;
use crate::proc::{KernelCtx, ProcGuard, ProcInfo, Procstate};

pub mod fcfs;
pub mod mlfq;
pub mod pbs;
pub mod rr;

/// Per-process scheduling bookkeeping.
#[derive(Copy, Clone, Debug)]
pub struct SchedInfo {
    /// Allocation tick; FCFS dispatch order, PBS final tie-break.
    pub start_time: u32,

    /// PBS static priority, 0..=100. Lower runs first.
    pub static_priority: u32,

    /// PBS: how many times the process has been dispatched.
    pub nscheduled: u32,

    /// PBS run/sleep history used by the niceness formula; -1 until
    /// the first dispatch. While running, `running_time` holds the
    /// dispatch tick; at sleep it becomes the elapsed run. The same
    /// dance applies to `sleeping_time` at sleep/wake.
    pub running_time: i64,
    pub sleeping_time: i64,

    /// MLFQ queue, 0 (highest) through `mlfq::NQUEUE` (sentinel).
    pub queue: usize,

    /// MLFQ: tick the process entered its queue; the aging clock.
    pub queued_at: u32,

    /// MLFQ: ticks consumed of the current quantum.
    pub quantum_ticks: u32,

    /// MLFQ: dispatch count.
    pub ndispatch: u32,
}

impl SchedInfo {
    pub const fn new() -> Self {
        Self::at_alloc(0)
    }

    /// The defaults a fresh slot gets in allocproc.
    pub const fn at_alloc(now: u32) -> Self {
        Self {
            start_time: now,
            static_priority: pbs::DEFAULT_PRIORITY,
            nscheduled: 0,
            running_time: -1,
            sleeping_time: -1,
            queue: 0,
            queued_at: now,
            quantum_ticks: 0,
            ndispatch: 0,
        }
    }
}

cfg_if! {
    if #[cfg(feature = "fcfs")] {
        use fcfs as active;
    } else if #[cfg(feature = "pbs")] {
        use pbs as active;
    } else if #[cfg(feature = "mlfq")] {
        use mlfq as active;
    } else {
        use rr as active;
    }
}

pub use active::scheduler;

/// Policy hook: the process is going SLEEPING.
pub(crate) fn on_sleep(info: &mut SchedInfo, now: u32) {
    active::on_sleep(info, now);
}

/// Policy hook: the process left SLEEPING for RUNNABLE.
pub(crate) fn on_wake(info: &mut SchedInfo, now: u32) {
    active::on_wake(info, now);
}

/// Policy hook: one tick elapsed while the process was RUNNING.
pub(crate) fn on_tick(info: &mut SchedInfo) {
    active::on_tick(info);
}

/// Policy hook: the current process just forked a RUNNABLE child.
pub(crate) fn on_fork_parent(ctx: &mut KernelCtx<'_>) {
    active::on_fork_parent(ctx);
}

/// One procdump line, in the linked policy's format.
pub(crate) fn dump_row<W: fmt::Write>(w: &mut W, info: &ProcInfo, name: &str, now: u32) {
    active::dump_row(w, info, name, now);
}

/// Change a process's PBS static priority; returns the old priority,
/// or 1 for an out-of-range priority, 2 for an unknown pid, 10 when
/// the PBS policy is not linked.
#[cfg(feature = "pbs")]
pub fn set_priority(ctx: &KernelCtx<'_>, priority: i32, pid: crate::proc::Pid) -> i32 {
    pbs::set_priority(kernel().procs(), ctx, priority, pid)
}

/// Change a process's PBS static priority; returns 10, as PBS is not
/// the linked policy of this build.
#[cfg(not(feature = "pbs"))]
pub fn set_priority(_ctx: &KernelCtx<'_>, _priority: i32, _pid: crate::proc::Pid) -> i32 {
    10
}

/// Ticks the slot has spent waiting: lifetime so far minus run time.
pub(crate) fn waited(info: &ProcInfo, now: u32) -> u32 {
    let end = if info.etime == 0 { now } else { info.etime };
    end.saturating_sub(info.ctime).saturating_sub(info.rtime)
}

/// Run the chosen process until it yields back to the scheduler. The
/// chosen slot's lock must be held by `guard`.
///
/// # Safety
///
/// Must be called from a CPU's scheduler loop, with `cpu` the current
/// CPU's slot.
pub(crate) unsafe fn run(cpu: *mut Cpu, guard: &mut ProcGuard<'_>) {
    let now = kernel().ticks();
    let info = guard.info_mut();
    info.state = Procstate::RUNNING;
    active::on_dispatch(&mut info.sched, now);

    // SAFETY: interrupts are off (the slot lock is held).
    unsafe { (*cpu).set_proc(guard.proc()) };
    let context = guard.context_raw();
    // SAFETY: it is the process's job to release its lock and then
    // reacquire it before jumping back to us.
    unsafe { arch::swtch(ptr::addr_of_mut!((*cpu).context), context) };

    // The process is done running for now; it changed its state before
    // coming back.
    unsafe { (*cpu).set_proc(ptr::null()) };
}
