//! Round robin, the default policy.
//!
//! Each CPU sweeps the table in order and gives every RUNNABLE slot
//! one turn. The only policy that is correct on several CPUs by
//! construction.

use core::fmt::{self, Write};
use core::ptr;

use super::SchedInfo;
use crate::arch;
use crate::cpu::CPUS;
use crate::kernel::kernel;
use crate::proc::{KernelCtx, ProcGuard, ProcInfo, Procs, Procstate};

/// The next RUNNABLE slot at or after `cursor`, in table order, with
/// its lock held. Advances the cursor past the pick.
pub fn select<'s>(procs: &'s Procs, cursor: &mut usize) -> Option<ProcGuard<'s>> {
    let pool = procs.process_pool();
    for _ in 0..pool.len() {
        let i = *cursor % pool.len();
        *cursor = (i + 1) % pool.len();
        let guard = pool[i].lock();
        if guard.state() == Procstate::RUNNABLE {
            return Some(guard);
        }
    }
    None
}

/// Per-CPU process scheduler. Each CPU calls scheduler() after setting
/// itself up; it never returns, looping between picking a RUNNABLE
/// process and switching into it.
///
/// # Safety
///
/// Must run on a dedicated scheduler stack, once per CPU.
pub unsafe fn scheduler() -> ! {
    let cpu = CPUS.current();
    // SAFETY: only the scheduler touches its own CPU slot here.
    unsafe { (*cpu).set_proc(ptr::null()) };
    let mut cursor = 0;
    loop {
        // Avoid deadlock by ensuring that devices can interrupt.
        unsafe { arch::intr_on() };

        if let Some(mut guard) = select(kernel().procs(), &mut cursor) {
            // SAFETY: called from this CPU's scheduler loop.
            unsafe { super::run(cpu, &mut guard) };
        }
    }
}

pub(crate) fn on_dispatch(_info: &mut SchedInfo, _now: u32) {}

pub(crate) fn on_sleep(_info: &mut SchedInfo, _now: u32) {}

pub(crate) fn on_wake(_info: &mut SchedInfo, _now: u32) {}

pub(crate) fn on_tick(_info: &mut SchedInfo) {}

pub(crate) fn on_fork_parent(_ctx: &mut KernelCtx<'_>) {}

pub(crate) fn dump_row<W: fmt::Write>(w: &mut W, info: &ProcInfo, name: &str, _now: u32) {
    let _ = writeln!(w, "{} {} {}", info.pid, info.state.as_str(), name);
}
