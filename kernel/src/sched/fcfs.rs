//! First-come first-served, non-preemptive.
//!
//! Each round runs the RUNNABLE slot with the smallest allocation tick
//! to completion of its turn; the trap path suppresses timer yields
//! while this policy is linked. Ties go to table order.

use core::fmt::{self, Write};
use core::ptr;

use super::SchedInfo;
use crate::arch;
use crate::cpu::CPUS;
use crate::kernel::kernel;
use crate::proc::{KernelCtx, ProcGuard, ProcInfo, Procs, Procstate};

/// The earliest-started RUNNABLE slot, with its lock held. While the
/// scan runs, only the reigning candidate's lock stays held; a beaten
/// candidate is released on the spot.
pub fn select<'s>(procs: &'s Procs) -> Option<ProcGuard<'s>> {
    let mut best: Option<ProcGuard<'s>> = None;
    for p in procs.process_pool() {
        let guard = p.lock();
        if guard.state() == Procstate::RUNNABLE {
            let earlier = best
                .as_ref()
                .map_or(true, |b| guard.info().sched.start_time < b.info().sched.start_time);
            if earlier {
                best = Some(guard);
                continue;
            }
        }
    }
    best
}

/// Per-CPU process scheduler; picks the oldest RUNNABLE process and
/// runs it without preemption.
///
/// # Safety
///
/// Must run on a dedicated scheduler stack, once per CPU.
pub unsafe fn scheduler() -> ! {
    let cpu = CPUS.current();
    // SAFETY: only the scheduler touches its own CPU slot here.
    unsafe { (*cpu).set_proc(ptr::null()) };
    loop {
        // Avoid deadlock by ensuring that devices can interrupt.
        unsafe { arch::intr_on() };

        if let Some(mut guard) = select(kernel().procs()) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::test_util::{setup, spawn};

    #[test]
    fn select_prefers_the_earliest_start() {
        let _env = setup();
        let a = spawn("fcfs-a");
        let b = spawn("fcfs-b");
        // Force distinct allocation ticks.
        a.lock().info_mut().sched.start_time = 40;
        b.lock().info_mut().sched.start_time = 10;

        let guard = select(kernel().procs()).expect("no pick");
        assert!(core::ptr::eq(guard.proc(), b));
    }

    #[test]
    fn ties_go_to_table_order() {
        let _env = setup();
        let a = spawn("fcfs-a");
        let b = spawn("fcfs-b");
        a.lock().info_mut().sched.start_time = 25;
        b.lock().info_mut().sched.start_time = 25;

        let guard = select(kernel().procs()).expect("no pick");
        assert!(core::ptr::eq(guard.proc(), a));
    }

    #[test]
    fn sleeping_slots_are_invisible() {
        let _env = setup();
        let a = spawn("fcfs-a");
        let b = spawn("fcfs-b");
        a.lock().info_mut().sched.start_time = 1;
        b.lock().info_mut().sched.start_time = 2;

        {
            let mut guard = a.lock();
            let info = guard.info_mut();
            info.chan = &a.child_chan as *const _;
            info.state = Procstate::SLEEPING;
        }

        let guard = select(kernel().procs()).expect("no pick");
        assert!(core::ptr::eq(guard.proc(), b));
    }
}
