//! Multi-level feedback queue.
//!
//! Four queues, 0 highest; FIFO within a queue; starved slots age one
//! level up; a slot that burns its whole quantum is demoted one level
//! by the trap path. Slots parked on the sentinel queue (or otherwise
//! outside 0..NQUEUE) fall back to a plain round robin. Designed for a
//! single CPU; the scan takes each candidate's lock anyway, so it is
//! memory-safe on several.

use core::fmt::{self, Write};
use core::ptr;

use super::SchedInfo;
use crate::arch;
use crate::cpu::CPUS;
use crate::kernel::kernel;
use crate::proc::{KernelCtx, ProcGuard, ProcInfo, Procs, Procstate};

/// Number of active queues; `NQUEUE` itself is the sentinel.
pub const NQUEUE: usize = 4;

/// Ticks a RUNNABLE slot may wait in queue q before promotion,
/// indexed by q.
pub const MAX_WAIT: [u32; NQUEUE + 1] = [0, 10, 30, 100, 150];

/// Quantum per queue in ticks. The trap path owns quantum enforcement;
/// these are the canonical escalation values.
pub const QUANTA: [u32; NQUEUE + 1] = [1, 2, 4, 8, 16];

/// Aging test for one slot.
pub fn should_promote(info: &SchedInfo, now: u32) -> bool {
    info.queue != 0
        && info.queue <= NQUEUE
        && now.saturating_sub(info.queued_at) > MAX_WAIT[info.queue]
}

/// Promote every starved RUNNABLE slot one queue, restarting its
/// aging clock.
pub fn upgrade_pass(procs: &Procs, now: u32) {
    for p in procs.process_pool() {
        let mut guard = p.lock();
        if guard.state() == Procstate::RUNNABLE && should_promote(&guard.info().sched, now) {
            let sched = &mut guard.info_mut().sched;
            sched.queued_at = now;
            sched.queue -= 1;
        }
    }
}

/// FIFO pick from the highest non-empty queue, lock held. Only the
/// reigning candidate's lock stays held during the scan.
pub fn pick_queued<'s>(procs: &'s Procs) -> Option<ProcGuard<'s>> {
    for q in 0..NQUEUE {
        let mut best: Option<ProcGuard<'s>> = None;
        for p in procs.process_pool() {
            let guard = p.lock();
            if guard.state() == Procstate::RUNNABLE && guard.info().sched.queue == q {
                let earlier = best
                    .as_ref()
                    .map_or(true, |b| guard.info().sched.queued_at < b.info().sched.queued_at);
                if earlier {
                    best = Some(guard);
                    continue;
                }
            }
        }
        if best.is_some() {
            return best;
        }
    }
    None
}

/// Round robin over the whole table for slots outside the active
/// queues. One full circle; None if nothing anywhere is RUNNABLE, so
/// the scheduler loop spins with interrupts on instead of wedging
/// here.
pub fn pick_fallback<'s>(procs: &'s Procs, cursor: &mut usize) -> Option<ProcGuard<'s>> {
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

/// One scheduling round: age, then pick.
pub fn select<'s>(procs: &'s Procs, cursor: &mut usize, now: u32) -> Option<ProcGuard<'s>> {
    upgrade_pass(procs, now);
    pick_queued(procs).or_else(|| pick_fallback(procs, cursor))
}

/// Per-CPU process scheduler.
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

        let now = kernel().ticks();
        if let Some(mut guard) = select(kernel().procs(), &mut cursor, now) {
            // SAFETY: called from this CPU's scheduler loop.
            unsafe { super::run(cpu, &mut guard) };
        }
    }
}

/// The wait timer is repurposed as the sleep timer while running.
pub(crate) fn on_dispatch(info: &mut SchedInfo, _now: u32) {
    info.queued_at = 0;
    info.ndispatch += 1;
}

pub(crate) fn on_sleep(_info: &mut SchedInfo, _now: u32) {}

/// Re-enqueue at the wake tick with a fresh quantum.
pub(crate) fn on_wake(info: &mut SchedInfo, now: u32) {
    info.queued_at = now;
    info.quantum_ticks = 0;
}

/// Count the running slot's quantum.
pub(crate) fn on_tick(info: &mut SchedInfo) {
    info.quantum_ticks += 1;
}

/// Favour new work: a parent below the top queue yields right after
/// forking, so its queue-0 child runs first.
pub(crate) fn on_fork_parent(ctx: &mut KernelCtx<'_>) {
    let yield_now = {
        let mut guard = ctx.proc().raw().lock();
        let sched = &mut guard.info_mut().sched;
        if sched.queue != 0 {
            sched.quantum_ticks = 0;
            true
        } else {
            false
        }
    };
    if yield_now {
        ctx.yield_cpu();
    }
}

/// Has the running slot used up its queue's quantum? Asked by the
/// timer path.
pub fn quantum_expired(info: &SchedInfo) -> bool {
    info.quantum_ticks >= QUANTA[info.queue.min(NQUEUE)]
}

/// Quantum-expiry demotion: one queue down (floor at the lowest active
/// queue), fresh aging clock, fresh quantum. Called by the timer path
/// before it makes the process yield.
pub fn demote(info: &mut SchedInfo, now: u32) {
    if info.queue < NQUEUE - 1 {
        info.queue += 1;
    }
    info.queued_at = now;
    info.quantum_ticks = 0;
}

pub(crate) fn dump_row<W: fmt::Write>(w: &mut W, info: &ProcInfo, _name: &str, now: u32) {
    let _ = writeln!(
        w,
        "{} {} {} {} {} {}",
        info.pid,
        info.sched.queue,
        info.state.as_str(),
        info.rtime,
        super::waited(info, now),
        info.sched.ndispatch,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::test_util::{setup, spawn};

    #[test]
    fn aging_thresholds_per_queue() {
        let mut info = SchedInfo::at_alloc(0);
        for (queue, limit) in [(1usize, 10u32), (2, 30), (3, 100), (4, 150)] {
            info.queue = queue;
            info.queued_at = 0;
            assert!(!should_promote(&info, limit));
            assert!(should_promote(&info, limit + 1));
        }
        // Queue 0 never ages.
        info.queue = 0;
        assert!(!should_promote(&info, 10_000));
    }

    #[test]
    fn upgrade_pass_promotes_and_restamps() {
        let _env = setup();
        let p = spawn("mlfq-age");
        {
            let mut guard = p.lock();
            let sched = &mut guard.info_mut().sched;
            sched.queue = 2;
            sched.queued_at = 0;
        }
        // 31 ticks beats queue 2's limit of 30.
        let now = 31;
        upgrade_pass(kernel().procs(), now);
        let guard = p.lock();
        assert_eq!(guard.info().sched.queue, 1);
        assert_eq!(guard.info().sched.queued_at, now);
    }

    #[test]
    fn upgrade_pass_skips_the_patient() {
        let _env = setup();
        let p = spawn("mlfq-wait");
        {
            let mut guard = p.lock();
            let sched = &mut guard.info_mut().sched;
            sched.queue = 2;
            sched.queued_at = 0;
        }
        upgrade_pass(kernel().procs(), 30);
        assert_eq!(p.lock().info().sched.queue, 2);
    }

    #[test]
    fn pick_prefers_the_higher_queue() {
        let _env = setup();
        let a = spawn("mlfq-a");
        let b = spawn("mlfq-b");
        a.lock().info_mut().sched.queue = 1;
        b.lock().info_mut().sched.queue = 0;

        let guard = pick_queued(kernel().procs()).expect("no pick");
        assert!(core::ptr::eq(guard.proc(), b));
    }

    #[test]
    fn pick_is_fifo_within_a_queue() {
        let _env = setup();
        let a = spawn("mlfq-a");
        let b = spawn("mlfq-b");
        {
            let mut guard = a.lock();
            guard.info_mut().sched.queue = 1;
            guard.info_mut().sched.queued_at = 9;
        }
        {
            let mut guard = b.lock();
            guard.info_mut().sched.queue = 1;
            guard.info_mut().sched.queued_at = 4;
        }

        let guard = pick_queued(kernel().procs()).expect("no pick");
        assert!(core::ptr::eq(guard.proc(), b));
    }

    #[test]
    fn sentinel_slots_fall_back_to_round_robin() {
        let _env = setup();
        let p = spawn("mlfq-s");
        p.lock().info_mut().sched.queue = NQUEUE;

        assert!(pick_queued(kernel().procs()).is_none());
        let mut cursor = 0;
        let guard = pick_fallback(kernel().procs(), &mut cursor).expect("no pick");
        assert!(core::ptr::eq(guard.proc(), p));
    }

    #[test]
    fn select_returns_none_on_an_idle_table() {
        let _env = setup();
        let mut cursor = 0;
        assert!(select(kernel().procs(), &mut cursor, 0).is_none());
    }

    #[test]
    fn quantum_table_and_demotion() {
        let mut info = SchedInfo::at_alloc(0);
        info.queue = 1;
        info.quantum_ticks = 1;
        assert!(!quantum_expired(&info));
        info.quantum_ticks = 2;
        assert!(quantum_expired(&info));

        demote(&mut info, 50);
        assert_eq!(info.queue, 2);
        assert_eq!(info.queued_at, 50);
        assert_eq!(info.quantum_ticks, 0);

        // The floor: queue 3 stays put on expiry.
        info.queue = 3;
        demote(&mut info, 60);
        assert_eq!(info.queue, 3);
    }

    #[test]
    fn wake_reenqueues_with_fresh_quantum() {
        let mut info = SchedInfo::at_alloc(0);
        info.quantum_ticks = 7;
        on_wake(&mut info, 33);
        assert_eq!(info.queued_at, 33);
        assert_eq!(info.quantum_ticks, 0);
    }

    #[test]
    fn dispatch_zeroes_the_wait_timer_and_counts() {
        let mut info = SchedInfo::at_alloc(12);
        on_dispatch(&mut info, 40);
        assert_eq!(info.queued_at, 0);
        assert_eq!(info.ndispatch, 1);
    }
}
