//! Sleep and wakeup on anonymous channels.

use core::ptr;

use super::*;
use crate::kernel::kernel;
use crate::lock::{Guard, RawLock};

/// A sleep channel. Channel identity is the address of the value, so
/// it must not be zero-sized: distinct channels need distinct
/// addresses, or wakeups would spuriously broadcast.
pub struct WaitChannel {
    _padding: u8,
}

impl WaitChannel {
    pub const fn new() -> Self {
        Self { _padding: 0 }
    }

    /// Atomically release `lk` and sleep on this channel; reacquires
    /// `lk` when awakened.
    ///
    /// p->lock must be held to change `state` and call `sched`; once it
    /// is held no wakeup can be missed (wakeup takes p->lock), so it is
    /// safe to let go of `lk`.
    pub fn sleep<R: RawLock, T>(&self, lk: &mut Guard<'_, R, T>, ctx: &KernelCtx<'_>) {
        let mut guard = ctx.proc().raw().lock();
        lk.reacquire_after(move || {
            let now = kernel().ticks();

            // Go to sleep.
            let info = guard.info_mut();
            info.chan = self as *const WaitChannel;
            info.state = Procstate::SLEEPING;
            crate::sched::on_sleep(&mut info.sched, now);

            // SAFETY: p->lock is held and the state is SLEEPING.
            unsafe { guard.sched() };

            // Tidy up.
            guard.info_mut().chan = ptr::null();
            drop(guard);

            // Reacquire the original lock on the way out.
        });
    }

    /// Wake all processes sleeping on this channel. Must be called
    /// without any p->lock.
    pub fn wakeup(&self) {
        kernel().procs().wakeup_pool(self);
    }
}
