//! The process table and the lifecycle that runs on it.

use core::fmt::{self, Write};
use core::ptr;
use core::str;
use core::sync::atomic::{AtomicPtr, Ordering};

use itertools::izip;

use crate::arch::{self, interface::ContextOps, interface::TrapFrameOps};
use crate::cpu::CPUS;
use crate::kalloc::{kalloc, kfree};
use crate::kernel::kernel;
use crate::lock::{SpinLock, SpinLockGuard};
use crate::memlayout::PGSIZE;
use crate::page::Page;
use crate::param::{NPROC, ROOTDEV};
use crate::sched;
use crate::vm::{UVAddr, UserMemory};

use super::*;

/// A user program that calls exec("/init").
/// od -t xC initcode
const INITCODE: [u8; 52] = [
    0x17, 0x05, 0x00, 0x00, 0x13, 0x05, 0x45, 0x02, 0x97, 0x05, 0x00, 0x00, 0x93, 0x85, 0x35, 0x02,
    0x93, 0x08, 0x70, 0x00, 0x73, 0x00, 0x00, 0x00, 0x93, 0x08, 0x20, 0x00, 0x73, 0x00, 0x00, 0x00,
    0xef, 0xf0, 0x9f, 0xff, 0x2f, 0x69, 0x6e, 0x69, 0x74, 0x00, 0x00, 0x24, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00,
];

/// Guard of the table-wide `wait_lock`.
pub type WaitGuard<'s> = SpinLockGuard<'s, ()>;

/// The process table.
pub struct Procs {
    nextpid: SpinLock<Pid>,

    pool: [Proc; NPROC],

    /// The first user process; written once by `user_proc_init`.
    initial_proc: AtomicPtr<Proc>,

    /// Helps ensure that wakeups of wait()ing parents are not lost and
    /// orders access to `Proc::parent`. Must be acquired before any
    /// p->lock.
    wait_lock: SpinLock<()>,
}

impl Procs {
    pub const fn new() -> Self {
        Self {
            nextpid: SpinLock::new("nextpid", 1),
            pool: [const { Proc::new() }; NPROC],
            initial_proc: AtomicPtr::new(ptr::null_mut()),
            wait_lock: SpinLock::new("wait_lock", ()),
        }
    }

    /// Give each slot its kernel stack. Called once at boot.
    ///
    /// # Safety
    ///
    /// No process exists yet.
    pub unsafe fn init(&self) {
        for p in &self.pool {
            let page = kalloc().expect("kalloc");
            // SAFETY: single-threaded boot; nobody else sees the slot.
            unsafe { (*p.data_raw()).kstack = page.into_usize() };
        }
    }

    pub fn process_pool(&self) -> &[Proc] {
        &self.pool
    }

    fn allocpid(&self) -> Pid {
        let mut nextpid = self.nextpid.lock();
        let pid = *nextpid;
        *nextpid += 1;
        pid
    }

    /// The first user process.
    pub fn initial_proc(&self) -> &Proc {
        let p = self.initial_proc.load(Ordering::Acquire);
        assert!(!p.is_null(), "initial_proc");
        // SAFETY: points into the static pool once set.
        unsafe { &*p }
    }

    pub fn initial_proc_ptr(&self) -> *const Proc {
        self.initial_proc.load(Ordering::Acquire)
    }

    /// Acquire the wait lock. Required before touching any `parent`.
    pub fn wait_guard(&self) -> WaitGuard<'_> {
        self.wait_lock.lock()
    }

    /// Look in the table for an UNUSED slot. If found, initialize the
    /// state required to run in the kernel and return with the slot
    /// lock held. If the table is full, take back `trap_frame` and
    /// `memory` and return Err.
    pub fn alloc(&self, trap_frame: Page, memory: UserMemory) -> Result<ProcGuard<'_>, ()> {
        let now = kernel().ticks();
        for p in &self.pool {
            let mut guard = p.lock();
            if guard.state() == Procstate::UNUSED {
                let pid = self.allocpid();
                // SAFETY: the slot cannot be anyone's current process yet.
                let data = unsafe { guard.data_mut() };
                data.trap_frame = trap_frame.into_usize() as *mut arch::TrapFrame;
                let _ = data.memory.write(memory);

                // The new context starts executing at forkret, which
                // returns to user space, on this slot's kernel stack.
                data.context = arch::Context::new();
                data.context.set_ret_addr(forkret as usize);
                data.context.set_stack_ptr(data.kstack + PGSIZE);

                let info = guard.info_mut();
                info.pid = pid;
                info.ctime = now;
                info.etime = 0;
                info.rtime = 0;
                info.sched = sched::SchedInfo::at_alloc(now);
                info.state = Procstate::USED;
                return Ok(guard);
            }
        }

        kfree(trap_frame);
        memory.free();
        Err(())
    }

    /// Set up the first user process.
    pub fn user_proc_init(&self) {
        let trap_frame = kalloc().expect("user_proc_init: kalloc");
        // One user page holding init's instructions and data.
        let memory = UserMemory::new(trap_frame.addr(), Some(&INITCODE))
            .expect("user_proc_init: UserMemory::new");
        let mut guard = self
            .alloc(trap_frame, memory)
            .expect("user_proc_init: alloc");

        // SAFETY: the slot cannot be anyone's current process yet.
        let data = unsafe { guard.data_mut() };

        // Prepare for the very first "return" from kernel to user.
        // SAFETY: trap_frame was initialized by alloc.
        let trap_frame = unsafe { &mut *data.trap_frame };
        trap_frame.set_pc(0); // user program counter
        trap_frame.set_stack_ptr(PGSIZE); // user stack pointer

        let name = b"initcode\x00";
        data.name[..name.len()].copy_from_slice(name);
        let cwd = kernel().fs().itable().namei("/").expect("user_proc_init: namei");
        let _ = data.cwd.write(cwd);

        // cwd is initialized now, so the slot may leave USED.
        guard.info_mut().state = Procstate::RUNNABLE;

        let p = guard.proc() as *const Proc as *mut Proc;
        drop(guard);
        self.initial_proc.store(p, Ordering::Release);
    }

    /// Create a new process, copying the parent. Sets up the child to
    /// return as if from fork(). Returns the child's pid.
    pub fn fork(&self, ctx: &mut KernelCtx<'_>) -> Result<Pid, ()> {
        // The trapframe page is rolled back if the memory copy fails.
        let trap_frame = scopeguard::guard(kalloc().ok_or(())?, kfree);

        // Copy user memory from parent to child.
        let memory = ctx
            .proc()
            .memory()
            .try_clone(trap_frame.addr())
            .ok_or(())?;

        // Allocate a slot.
        let mut np = self.alloc(scopeguard::ScopeGuard::into_inner(trap_frame), memory)?;

        // SAFETY: the child cannot be anyone's current process yet.
        let npdata = unsafe { np.data_mut() };

        // Copy saved user registers.
        // SAFETY: both trapframes were initialized by alloc.
        unsafe { *npdata.trap_frame = *ctx.proc().trap_frame() };

        // Cause fork to return 0 in the child.
        unsafe { (*npdata.trap_frame).set_ret_val(0) };

        // Increment reference counts on open file descriptors.
        let ftable = ctx.kernel().ftable();
        for (nf, f) in izip!(
            npdata.open_files.iter_mut(),
            ctx.proc().data().open_files.iter()
        ) {
            if let Some(file) = f {
                *nf = Some(ftable.dup(file));
            }
        }
        let _ = npdata.cwd.write(ctx.kernel().fs().itable().dup(ctx.proc().cwd()));

        npdata.name = ctx.proc().data().name;

        let pid = np.info().pid;

        // The parent pointer is written under wait_lock, and the lock
        // order is wait_lock -> p->lock, so drop the child lock first.
        np.reacquire_after(|child| {
            let mut parent_guard = self.wait_guard();
            *child.parent.get_mut(&mut parent_guard) = ctx.proc().raw() as *const Proc;
        });

        // cwd is initialized now, so the slot may leave USED.
        np.info_mut().state = Procstate::RUNNABLE;
        drop(np);

        // Under MLFQ a parent below the top queue yields to its
        // queue-0 child.
        sched::on_fork_parent(ctx);

        Ok(pid)
    }

    /// Pass p's abandoned children to init. The caller holds the wait
    /// lock.
    pub fn reparent(&self, proc: *const Proc, parent_guard: &mut WaitGuard<'_>) {
        for pp in &self.pool {
            let parent = pp.parent.get_mut(parent_guard);
            if *parent == proc {
                *parent = self.initial_proc() as *const Proc;
                self.initial_proc().child_chan.wakeup();
            }
        }
    }

    /// Exit the current process. Does not return. The process remains
    /// a zombie until its parent calls wait.
    pub fn exit_current(&self, status: i32, ctx: &mut KernelCtx<'_>) -> ! {
        assert!(
            !ptr::eq(ctx.proc().raw(), self.initial_proc()),
            "init exiting"
        );

        // Close all open files.
        let ftable = ctx.kernel().ftable();
        for slot in ctx.proc_mut().data_mut().open_files.iter_mut() {
            if let Some(file) = slot.take() {
                ftable.close(file);
            }
        }

        let tx = ctx.kernel().fs().begin_tx();
        // SAFETY: cwd is initialized and will not be used again.
        let cwd = unsafe { ctx.proc_mut().data_mut().cwd.assume_init_read() };
        ctx.kernel().fs().itable().put(cwd);
        tx.end();

        let mut parent_guard = self.wait_guard();

        // Give any children to init.
        self.reparent(ctx.proc().raw(), &mut parent_guard);

        // Parent might be sleeping in wait().
        let parent = *ctx.proc().raw().parent.get_mut(&mut parent_guard);
        assert!(!parent.is_null(), "exit: no parent");
        // SAFETY: `parent` points into the static pool (it was written
        // under wait_lock and slots never move).
        unsafe { (*parent).child_chan.wakeup() };

        let mut guard = ctx.proc().raw().lock();
        let now = ctx.kernel().ticks();
        let info = guard.info_mut();
        info.xstate = status;
        info.etime = now;
        info.state = Procstate::ZOMBIE;

        drop(parent_guard);

        // Jump into the scheduler, never to return.
        // SAFETY: p->lock is held and the state is ZOMBIE.
        unsafe { guard.sched() };

        unreachable!("zombie exit")
    }

    /// One pass of the reaping loop shared by `wait` and `waitx`.
    fn reap(&self, addr: UVAddr, ctx: &mut KernelCtx<'_>) -> Result<(Pid, u32, u32), ()> {
        let me = ctx.proc().raw() as *const Proc;
        let mut parent_guard = self.wait_guard();

        loop {
            // Scan through the table looking for exited children.
            let mut havekids = false;
            for np in &self.pool {
                if *np.parent.get_mut(&mut parent_guard) != me {
                    continue;
                }
                // Make sure the child isn't still in exit() or swtch().
                let mut child = np.lock();
                havekids = true;
                if child.state() == Procstate::ZOMBIE {
                    let info = child.info();
                    let pid = info.pid;
                    let rtime = info.rtime;
                    let wtime = info.etime - info.ctime - info.rtime;
                    let xstate = info.xstate;
                    if !addr.is_null()
                        && ctx.proc_mut().memory_mut().copy_out(addr, &xstate).is_err()
                    {
                        return Err(());
                    }
                    // Reap the zombie.
                    // SAFETY: the child is ZOMBIE, hence not running.
                    unsafe { child.clear(&mut parent_guard) };
                    return Ok((pid, rtime, wtime));
                }
            }

            // No point waiting if we don't have any children.
            if !havekids || ctx.proc().raw().killed() {
                return Err(());
            }

            // Wait for a child to exit.
            ctx.proc().raw().child_chan.sleep(&mut parent_guard, ctx);
        }
    }

    /// Wait for a child to exit and return its pid. If `addr` is not
    /// null the child's exit status is copied there first.
    pub fn wait(&self, addr: UVAddr, ctx: &mut KernelCtx<'_>) -> Result<Pid, ()> {
        let (pid, _, _) = self.reap(addr, ctx)?;
        Ok(pid)
    }

    /// `wait`, plus the child's run time and wait time in ticks.
    pub fn waitx(&self, addr: UVAddr, ctx: &mut KernelCtx<'_>) -> Result<(Pid, u32, u32), ()> {
        self.reap(addr, ctx)
    }

    /// Kill the process with the given pid. The victim won't exit
    /// until it tries to return to user space.
    pub fn kill(&self, pid: Pid) -> Result<(), ()> {
        let now = kernel().ticks();
        for p in &self.pool {
            let mut guard = p.lock();
            if guard.info().pid == pid && guard.state() != Procstate::UNUSED {
                p.kill();
                // A sleeping victim is yanked back to RUNNABLE so it
                // can observe the flag.
                guard.wake(now);
                return Ok(());
            }
        }
        Err(())
    }

    /// Wake every process sleeping on `target`. Must be called without
    /// any p->lock.
    pub fn wakeup_pool(&self, target: &WaitChannel) {
        let current = CPUS.current_proc();
        let now = kernel().ticks();
        for p in &self.pool {
            if ptr::eq(p as *const Proc, current) {
                continue;
            }
            let mut guard = p.lock();
            if guard.info().chan == target as *const WaitChannel {
                guard.wake(now);
            }
        }
    }

    /// Tick-driven accounting, invoked once per timer tick: every
    /// RUNNING slot gains a tick of rtime and the active policy counts
    /// the quantum.
    pub fn update_time(&self) {
        for p in &self.pool {
            let mut guard = p.lock();
            if guard.state() == Procstate::RUNNING {
                let info = guard.info_mut();
                info.rtime += 1;
                sched::on_tick(&mut info.sched);
            }
        }
    }

    /// Print a process listing. No locks, so this cannot wedge a stuck
    /// machine further.
    pub fn dump<W: fmt::Write>(&self, w: &mut W) {
        let now = kernel().ticks();
        let _ = writeln!(w);
        for p in &self.pool {
            // Lock-free peek; the listing is debug output.
            let info = unsafe { &*p.info.get_mut_raw() };
            if info.state == Procstate::UNUSED {
                continue;
            }
            let data = unsafe { &*p.data_raw() };
            let len = data
                .name
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(data.name.len());
            let name = str::from_utf8(&data.name[..len]).unwrap_or("???");
            sched::dump_row(w, info, name, now);
        }
    }
}

/// A fork child's very first scheduling by scheduler() will swtch here.
unsafe extern "C" fn forkret() -> ! {
    // SAFETY: scheduler() installed this process before dispatching it.
    let ctx = unsafe { current_ctx() }.expect("forkret: no process");

    // Still holding p->lock from scheduler.
    unsafe { ctx.proc().raw().info.unlock() };

    if !ctx.kernel().fs().initialized() {
        // File system initialization must be run in the context of a
        // regular process (e.g. because it sleeps), and thus cannot be
        // run from main().
        ctx.kernel().fs().init(ROOTDEV);
    }

    // SAFETY: the trapframe was set up by userinit or fork.
    unsafe { arch::user_trap_ret() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::test_util::{adopt, ensure_init_proc, find, setup, spawn, zombify};
    use crate::proc::CopyTarget;

    #[test]
    fn alloc_reserves_and_clear_releases() {
        let _env = setup();
        let procs = kernel().procs();

        let trap_frame = kalloc().expect("arena exhausted");
        let memory = UserMemory::new(trap_frame.addr(), None).expect("no memory");
        let mut guard = procs.alloc(trap_frame, memory).expect("no free slot");

        assert_eq!(guard.state(), Procstate::USED);
        assert!(guard.info().pid > 0);
        let data = unsafe { guard.data_mut() };
        assert!(!data.trap_frame.is_null());
        // The first dispatch enters forkret on this slot's kernel stack.
        assert_eq!(data.context.ra, forkret as usize);
        assert_eq!(data.context.sp, data.kstack + PGSIZE);

        // Release and retake in wait_lock -> p->lock order, as a real
        // reaper would.
        let p = guard.proc();
        drop(guard);
        let mut wait_guard = procs.wait_guard();
        let mut guard = p.lock();
        unsafe { guard.clear(&mut wait_guard) };
        assert_eq!(guard.state(), Procstate::UNUSED);
        assert_eq!(guard.info().pid, 0);
        assert!(guard.info().chan.is_null());
    }

    #[test]
    fn pids_are_monotone() {
        let _env = setup();
        let a = spawn("mono-a");
        let b = spawn("mono-b");
        let pid_a = a.lock().info().pid;
        let pid_b = b.lock().info().pid;
        assert!(pid_b > pid_a);
    }

    #[test]
    fn userinit_boots_init() {
        let _env = setup();
        let procs = kernel().procs();
        let fresh = procs.initial_proc_ptr().is_null();
        let init = ensure_init_proc();

        let guard = init.lock();
        assert!(guard.info().pid >= 1);
        if fresh {
            assert_eq!(guard.state(), Procstate::RUNNABLE);
        }
        let data = unsafe { &*init.data_raw() };
        assert!(data.name.starts_with(b"initcode\x00"));
        let memory = unsafe { data.memory.assume_init_ref() };
        assert_eq!(memory.size(), PGSIZE);
        let trap_frame = unsafe { &*data.trap_frame };
        assert_eq!(trap_frame.pc(), 0);
        assert_eq!(trap_frame.stack_ptr(), PGSIZE);
        drop(guard);

        if fresh {
            // The default scheduler picks it on the first round.
            let mut cursor = 0;
            let pick = crate::sched::rr::select(procs, &mut cursor).expect("no pick");
            assert!(ptr::eq(pick.proc(), init));
        }
    }

    #[test]
    fn fork_copies_the_parent() {
        let _env = setup();
        let parent = spawn("forker");
        let mut ctx = adopt(parent);

        let file = kernel().ftable().alloc().expect("ftable full");
        ctx.proc_mut().data_mut().open_files[0] = Some(file);
        let trap_frame = ctx.proc_mut().trap_frame_mut();
        trap_frame.epc = 0x3000;
        trap_frame.sp = 0x800;
        trap_frame.a0 = 123;
        trap_frame.a1 = 77;

        let parent_pid = ctx.proc().pid();
        let child_pid = kernel().procs().fork(&mut ctx).expect("fork failed");
        assert!(child_pid > parent_pid);

        let child = find(child_pid).expect("child vanished");
        let guard = child.lock();
        assert_eq!(guard.state(), Procstate::RUNNABLE);

        let child_data = unsafe { &*child.data_raw() };
        let child_memory = unsafe { child_data.memory.assume_init_ref() };
        assert_eq!(child_memory.size(), ctx.proc().memory().size());
        assert!(child_data.name.starts_with(b"forker"));

        // The trapframe is the parent's, except fork returns 0 here.
        let child_tf = unsafe { &*child_data.trap_frame };
        assert_eq!(child_tf.epc, 0x3000);
        assert_eq!(child_tf.sp, 0x800);
        assert_eq!(child_tf.a1, 77);
        assert_eq!(child_tf.a0, 0);

        // The open file is shared: refcount at least 2 until one side
        // lets go.
        let parent_file = ctx.proc().data().open_files[0].as_ref().unwrap();
        assert!(kernel().ftable().nref(parent_file) >= 2);
        drop(guard);

        // The parent pointer was recorded under wait_lock.
        let mut wait_guard = kernel().procs().wait_guard();
        assert!(ptr::eq(
            *child.parent.get_mut(&mut wait_guard),
            parent as *const Proc
        ));
    }

    #[test]
    fn wait_reaps_a_zombie_child() {
        let _env = setup();
        let parent = spawn("waiter");
        let mut ctx = adopt(parent);

        let child_pid = kernel().procs().fork(&mut ctx).expect("fork failed");
        let child = find(child_pid).expect("child vanished");
        zombify(child, 42);

        let addr = UVAddr::new(64);
        let reaped = kernel().procs().wait(addr, &mut ctx).expect("wait failed");
        assert_eq!(reaped, child_pid);

        // The 32-bit status landed in the parent's memory.
        let mut bytes = [0u8; 4];
        ctx.proc()
            .memory()
            .copy_in_bytes(&mut bytes, addr)
            .expect("copy_in");
        assert_eq!(i32::from_ne_bytes(bytes), 42);

        // The slot is free again.
        assert!(find(child_pid).is_none());
        assert_eq!(child.lock().state(), Procstate::UNUSED);
    }

    #[test]
    fn wait_with_null_addr_skips_the_copy() {
        let _env = setup();
        let parent = spawn("waiter2");
        let mut ctx = adopt(parent);

        let child_pid = kernel().procs().fork(&mut ctx).expect("fork failed");
        zombify(find(child_pid).expect("child vanished"), 7);

        let reaped = kernel()
            .procs()
            .wait(UVAddr::new(0), &mut ctx)
            .expect("wait failed");
        assert_eq!(reaped, child_pid);
    }

    #[test]
    fn waitx_reports_run_and_wait_times() {
        let _env = setup();
        let parent = spawn("waiter3");
        let mut ctx = adopt(parent);

        let child_pid = kernel().procs().fork(&mut ctx).expect("fork failed");
        let child = find(child_pid).expect("child vanished");
        zombify(child, 0);
        {
            let mut guard = child.lock();
            let info = guard.info_mut();
            info.ctime = 10;
            info.rtime = 4;
            info.etime = 30;
        }

        let (pid, rtime, wtime) = kernel()
            .procs()
            .waitx(UVAddr::new(0), &mut ctx)
            .expect("waitx failed");
        assert_eq!(pid, child_pid);
        assert_eq!(rtime, 4);
        assert_eq!(wtime, 30 - 10 - 4);
    }

    #[test]
    fn wait_without_children_fails() {
        let _env = setup();
        let lonely = spawn("lonely");
        let mut ctx = adopt(lonely);
        assert_eq!(kernel().procs().wait(UVAddr::new(0), &mut ctx), Err(()));
    }

    #[test]
    fn wait_of_a_killed_parent_fails() {
        let _env = setup();
        let parent = spawn("doomed");
        let mut ctx = adopt(parent);
        let _child_pid = kernel().procs().fork(&mut ctx).expect("fork failed");

        // The child is alive, so wait would block; the killed flag
        // turns it into an error instead.
        parent.kill();
        assert_eq!(kernel().procs().wait(UVAddr::new(0), &mut ctx), Err(()));
    }

    #[test]
    fn reparent_hands_children_to_init_and_wakes_it() {
        let _env = setup();
        let init = ensure_init_proc();
        {
            // Park init where it lives between reaps.
            let mut guard = init.lock();
            if guard.state() != Procstate::SLEEPING {
                let info = guard.info_mut();
                info.chan = &init.child_chan as *const WaitChannel;
                info.state = Procstate::SLEEPING;
            }
        }

        let parent = spawn("orphaner");
        let mut ctx = adopt(parent);
        let child_pid = kernel().procs().fork(&mut ctx).expect("fork failed");
        let child = find(child_pid).expect("child vanished");

        let procs = kernel().procs();
        {
            let mut wait_guard = procs.wait_guard();
            procs.reparent(parent as *const Proc, &mut wait_guard);
            assert!(ptr::eq(
                *child.parent.get_mut(&mut wait_guard),
                init as *const Proc
            ));
        }

        // Init was woken to reap the orphan.
        assert_eq!(init.lock().state(), Procstate::RUNNABLE);
    }

    #[test]
    fn kill_unblocks_a_sleeper() {
        let _env = setup();
        let victim = spawn("victim");
        let pid = victim.lock().info().pid;
        {
            let mut guard = victim.lock();
            let info = guard.info_mut();
            info.chan = &victim.child_chan as *const WaitChannel;
            info.state = Procstate::SLEEPING;
        }

        assert_eq!(kernel().procs().kill(pid), Ok(()));

        let guard = victim.lock();
        assert_eq!(guard.state(), Procstate::RUNNABLE);
        assert!(guard.info().chan.is_null());
        assert!(victim.killed());
    }

    #[test]
    fn kill_of_an_unknown_pid_fails() {
        let _env = setup();
        assert_eq!(kernel().procs().kill(999_999), Err(()));
    }

    #[test]
    fn wakeup_is_channel_selective_and_idempotent() {
        let _env = setup();
        let a = spawn("sleeper-a");
        let b = spawn("sleeper-b");
        for p in [a, b] {
            let mut guard = p.lock();
            let info = guard.info_mut();
            info.chan = &p.child_chan as *const WaitChannel;
            info.state = Procstate::SLEEPING;
        }

        // Nothing sleeps on this channel; broadcasting is a no-op.
        static IDLE_CHAN: WaitChannel = WaitChannel::new();
        IDLE_CHAN.wakeup();
        assert_eq!(a.lock().state(), Procstate::SLEEPING);
        assert_eq!(b.lock().state(), Procstate::SLEEPING);

        a.child_chan.wakeup();
        assert_eq!(a.lock().state(), Procstate::RUNNABLE);
        assert!(a.lock().info().chan.is_null());
        assert_eq!(b.lock().state(), Procstate::SLEEPING);

        // Waking again changes nothing.
        a.child_chan.wakeup();
        assert_eq!(a.lock().state(), Procstate::RUNNABLE);
    }

    #[test]
    fn grow_memory_extends_and_shrinks() {
        let _env = setup();
        let p = spawn("grower");
        let mut ctx = adopt(p);
        let base = ctx.proc().memory().size();

        ctx.grow_memory(PGSIZE as isize).expect("grow failed");
        assert_eq!(ctx.proc().memory().size(), base + PGSIZE);

        ctx.grow_memory(-(PGSIZE as isize)).expect("shrink failed");
        assert_eq!(ctx.proc().memory().size(), base);
    }

    #[test]
    fn either_copy_routes_both_ways() {
        let _env = setup();
        let p = spawn("copier");
        let mut ctx = adopt(p);

        let mut kernel_buf = [0u8; 4];
        unsafe {
            ctx.proc_mut()
                .either_copy_out(CopyTarget::Kernel(kernel_buf.as_mut_ptr()), &[9, 8, 7, 6])
                .expect("kernel copy");
        }
        assert_eq!(kernel_buf, [9, 8, 7, 6]);

        let addr = UVAddr::new(128);
        unsafe {
            ctx.proc_mut()
                .either_copy_out(CopyTarget::User(addr), &[1, 2, 3, 4])
                .expect("user copy");
        }
        let mut back = [0u8; 4];
        ctx.proc()
            .memory()
            .copy_in_bytes(&mut back, addr)
            .expect("copy_in");
        assert_eq!(back, [1, 2, 3, 4]);
    }

    #[test]
    fn dump_skips_unused_slots() {
        let _env = setup();
        let p = spawn("dumped");
        let pid = p.lock().info().pid;

        let mut out = String::new();
        kernel().procs().dump(&mut out);
        assert!(out.contains(&pid.to_string()));
        assert!(!out.contains("unused"));
    }
}
