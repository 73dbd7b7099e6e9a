//! Priority-based scheduling with dynamic niceness.
//!
//! A slot's dynamic priority combines its static priority (0..=100,
//! default 60, lower is better) with a niceness in 0..=10 derived from
//! how much of its recent life it spent asleep versus running. Ties
//! fall through: fewer dispatches first, then earlier start.

use core::fmt::{self, Write};
use core::ptr;

use super::SchedInfo;
use crate::arch;
use crate::cpu::CPUS;
use crate::kernel::kernel;
use crate::proc::{KernelCtx, Pid, ProcGuard, ProcInfo, Procs, Procstate};

/// Static priority a fresh slot starts with.
pub const DEFAULT_PRIORITY: u32 = 60;

/// Niceness: share of recent history spent sleeping, scaled to 0..=10.
/// Neutral (5) until the process has been dispatched once, and when
/// there is no history to divide by.
pub fn niceness(info: &SchedInfo) -> i64 {
    if info.running_time == -1 && info.sleeping_time == -1 {
        return 5;
    }
    let denom = info.running_time + info.sleeping_time;
    if denom <= 0 {
        return 5;
    }
    info.sleeping_time * 10 / denom
}

/// Dynamic priority in 0..=100; lower is better.
pub fn dynamic_priority(info: &SchedInfo) -> i64 {
    let value = info.static_priority as i64 - niceness(info) + 5;
    value.clamp(0, 100)
}

/// Is `a` a strictly better pick than `b`?
pub fn better(a: &SchedInfo, b: &SchedInfo) -> bool {
    let (pa, pb) = (dynamic_priority(a), dynamic_priority(b));
    if pa != pb {
        return pa < pb;
    }
    // Dispatched fewer times wins.
    if a.nscheduled != b.nscheduled {
        return a.nscheduled < b.nscheduled;
    }
    // Started earlier wins; a full tie keeps the incumbent.
    a.start_time < b.start_time
}

/// The best RUNNABLE slot by dynamic priority, with its lock held.
/// Only the reigning candidate's lock stays held during the scan.
pub fn select<'s>(procs: &'s Procs) -> Option<ProcGuard<'s>> {
    let mut best: Option<ProcGuard<'s>> = None;
    for p in procs.process_pool() {
        let guard = p.lock();
        if guard.state() == Procstate::RUNNABLE {
            let wins = best
                .as_ref()
                .map_or(true, |b| better(&guard.info().sched, &b.info().sched));
            if wins {
                best = Some(guard);
                continue;
            }
        }
    }
    best
}

/// Per-CPU process scheduler; repeatedly dispatches the slot with the
/// best dynamic priority.
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

/// Start the run clock and wipe the sleep history for this stint.
pub(crate) fn on_dispatch(info: &mut SchedInfo, now: u32) {
    info.nscheduled += 1;
    info.sleeping_time = 0;
    info.running_time = now as i64;
}

/// Close the run clock, start the sleep clock.
pub(crate) fn on_sleep(info: &mut SchedInfo, now: u32) {
    info.running_time = now as i64 - info.running_time;
    info.sleeping_time = now as i64;
}

/// Close the sleep clock.
pub(crate) fn on_wake(info: &mut SchedInfo, now: u32) {
    info.sleeping_time = now as i64 - info.sleeping_time;
}

pub(crate) fn on_tick(_info: &mut SchedInfo) {}

pub(crate) fn on_fork_parent(_ctx: &mut KernelCtx<'_>) {}

pub(crate) fn dump_row<W: fmt::Write>(w: &mut W, info: &ProcInfo, _name: &str, now: u32) {
    let _ = writeln!(
        w,
        "{} {} {} {} {} {}",
        info.pid,
        dynamic_priority(&info.sched),
        info.state.as_str(),
        info.rtime,
        super::waited(info, now),
        info.sched.nscheduled,
    );
}

/// Change `pid`'s static priority to `priority`, resetting its
/// niceness history. Returns the old static priority; 1 if `priority`
/// is out of range, 2 if no RUNNABLE or SLEEPING slot has `pid`. If
/// the new priority is numerically greater (worse) than the old, the
/// caller yields.
pub fn set_priority(procs: &Procs, ctx: &KernelCtx<'_>, priority: i32, pid: Pid) -> i32 {
    if !(0..=100).contains(&priority) {
        return 1;
    }
    for p in procs.process_pool() {
        let mut guard = p.lock();
        let found = {
            let info = guard.info();
            (info.state == Procstate::RUNNABLE || info.state == Procstate::SLEEPING)
                && info.pid == pid
        };
        if found {
            let sched = &mut guard.info_mut().sched;
            let old = sched.static_priority as i32;
            sched.static_priority = priority as u32;
            // The next niceness computation starts from scratch.
            sched.running_time = -1;
            sched.sleeping_time = -1;
            drop(guard);
            if priority > old {
                ctx.yield_cpu();
            }
            return old;
        }
    }
    2
}
