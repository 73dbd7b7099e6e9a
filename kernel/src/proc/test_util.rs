//! Scaffolding shared by tests that touch the kernel statics.
//!
//! The kernel value, the CPU registry and the page arena are
//! process-wide statics, so table-level tests serialize on one mutex
//! and each test starts from a scrubbed table.

use std::sync::{Mutex, MutexGuard, Once};

use super::*;
use crate::cpu::CPUS;
use crate::kalloc::kalloc;
use crate::kernel::kernel;
use crate::vm::UserMemory;

static LOCK: Mutex<()> = Mutex::new(());
static INIT: Once = Once::new();
static INIT_PROC: Once = Once::new();

/// Serialize the test, initialize the kernel once, scrub the table.
pub fn setup() -> MutexGuard<'static, ()> {
    let guard = match LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    INIT.call_once(|| {
        // SAFETY: Once runs this exactly one time, before any test body.
        unsafe { kernel().init() };
    });
    scrub();
    guard
}

/// Set up the first user process exactly once across the test run.
pub fn ensure_init_proc() -> &'static Proc {
    INIT_PROC.call_once(|| kernel().procs().user_proc_init());
    kernel().procs().initial_proc()
}

/// Free every slot except the initial process and detach the CPU.
fn scrub() {
    let procs = kernel().procs();
    // SAFETY: nothing is running in this serialized test world.
    unsafe { (*CPUS.current()).set_proc(core::ptr::null()) };

    let initial = procs.initial_proc_ptr();
    if !initial.is_null() {
        // Park init where it lives between reaps: asleep in wait().
        let init = unsafe { &*initial };
        let mut guard = init.lock();
        if guard.state() != Procstate::SLEEPING {
            let info = guard.info_mut();
            info.chan = &init.child_chan as *const WaitChannel;
            info.state = Procstate::SLEEPING;
        }
    }

    let mut wait_guard = procs.wait_guard();
    for p in procs.process_pool() {
        if core::ptr::eq(p as *const Proc, initial) {
            continue;
        }
        let mut guard = p.lock();
        if guard.state() == Procstate::UNUSED {
            continue;
        }
        if guard.state() != Procstate::USED {
            // cwd and open files are initialized past USED.
            let data = unsafe { guard.data_mut() };
            let cwd = unsafe { data.cwd.assume_init_read() };
            kernel().fs().itable().put(cwd);
            for slot in data.open_files.iter_mut() {
                if let Some(file) = slot.take() {
                    kernel().ftable().close(file);
                }
            }
        }
        // SAFETY: the slot is not running in this test world.
        unsafe { guard.clear(&mut wait_guard) };
    }
}

/// Allocate a RUNNABLE slot the way userinit would.
pub fn spawn(name: &str) -> &'static Proc {
    let procs = kernel().procs();
    let trap_frame = kalloc().expect("arena exhausted");
    let memory =
        UserMemory::new(trap_frame.addr(), Some(&[0x13, 0x00, 0x00, 0x00])).expect("no memory");
    let mut guard = procs.alloc(trap_frame, memory).expect("no free slot");

    let data = unsafe { guard.data_mut() };
    let n = name.len().min(data.name.len() - 1);
    data.name[..n].copy_from_slice(&name.as_bytes()[..n]);
    let cwd = kernel().fs().itable().namei("/").expect("namei");
    let _ = data.cwd.write(cwd);

    guard.info_mut().state = Procstate::RUNNABLE;
    let p = guard.proc();
    drop(guard);
    p
}

/// Install `p` as the current process, the way a dispatch would, and
/// return the thread's context.
pub fn adopt(p: &'static Proc) -> KernelCtx<'static> {
    p.lock().info_mut().state = Procstate::RUNNING;
    // SAFETY: serialized test world; this thread is "the CPU".
    unsafe { (*CPUS.current()).set_proc(p) };
    unsafe { current_ctx() }.expect("no current proc")
}

/// Look a live slot up by pid.
pub fn find(pid: Pid) -> Option<&'static Proc> {
    let procs = kernel().procs();
    for p in procs.process_pool() {
        let guard = p.lock();
        if guard.info().pid == pid && guard.state() != Procstate::UNUSED {
            return Some(guard.proc());
        }
    }
    None
}

/// Mark `p` ZOMBIE with `xstate`, releasing its files and cwd, the way
/// exit would, minus the context switch a test cannot take.
pub fn zombify(p: &Proc, xstate: i32) {
    let now = kernel().ticks();
    let mut guard = p.lock();
    assert_ne!(guard.state(), Procstate::UNUSED);

    let data = unsafe { guard.data_mut() };
    let cwd = unsafe { data.cwd.assume_init_read() };
    kernel().fs().itable().put(cwd);
    for slot in data.open_files.iter_mut() {
        if let Some(file) = slot.take() {
            kernel().ftable().close(file);
        }
    }

    let info = guard.info_mut();
    info.xstate = xstate;
    info.etime = now;
    info.state = Procstate::ZOMBIE;
}

/// Advance the kernel clock by `n` ticks.
pub fn tick(n: u32) {
    for _ in 0..n {
        kernel().clock_tick();
    }
}
