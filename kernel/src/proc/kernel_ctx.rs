//! The current thread's context.
//!
//! Operations that act on "the current process" take a [`KernelCtx`]
//! instead of looking it up themselves, so the call graph says which
//! functions assume a process context and which do not.

use core::ptr;

use super::*;
use crate::kernel::{kernel, Kernel};
use crate::vm::UVAddr;

/// The context of the current thread: the kernel plus the process the
/// current CPU is running.
pub struct KernelCtx<'s> {
    kernel: &'s Kernel,
    proc: CurrentProc<'s>,
}

/// A reference to the current CPU's process.
///
/// # Safety
///
/// `inner` is the process the current CPU dispatched; its `ProcData`
/// may be accessed without the slot lock, because only the owning
/// thread does so while the process is current.
pub struct CurrentProc<'s> {
    inner: &'s Proc,
}

/// Destination of a copy that may cross the user boundary.
pub enum CopyTarget {
    User(UVAddr),
    Kernel(*mut u8),
}

/// Source of a copy that may cross the user boundary.
pub enum CopySource {
    User(UVAddr),
    Kernel(*const u8),
}

impl<'s> KernelCtx<'s> {
    pub fn kernel(&self) -> &'s Kernel {
        self.kernel
    }

    pub fn proc(&self) -> &CurrentProc<'s> {
        &self.proc
    }

    pub fn proc_mut(&mut self) -> &mut CurrentProc<'s> {
        &mut self.proc
    }

    /// Give up the CPU for one scheduling round.
    pub fn yield_cpu(&self) {
        let mut guard = self.proc.inner.lock();
        guard.info_mut().state = Procstate::RUNNABLE;
        // SAFETY: p->lock is held and the state is RUNNABLE.
        unsafe { guard.sched() };
    }

    /// Grow or shrink the current process's memory by `n` bytes.
    pub fn grow_memory(&mut self, n: isize) -> Result<(), ()> {
        let memory = self.proc_mut().memory_mut();
        let sz = memory.size();
        if n > 0 {
            memory.alloc(sz + n as usize)?;
        } else if n < 0 {
            memory.dealloc(sz.saturating_sub(n.unsigned_abs()));
        }
        Ok(())
    }
}

impl<'s> CurrentProc<'s> {
    pub fn raw(&self) -> &'s Proc {
        self.inner
    }

    pub fn pid(&self) -> Pid {
        // pid does not change while the process is current.
        unsafe { (*self.inner.info.get_mut_raw()).pid }
    }

    /// The process's private data.
    pub fn data(&self) -> &ProcData {
        // SAFETY: only the owning thread touches ProcData while the
        // process is current.
        unsafe { &*self.inner.data_raw() }
    }

    pub fn data_mut(&mut self) -> &mut ProcData {
        // SAFETY: ditto; `&mut self` is exclusive.
        unsafe { &mut *self.inner.data_raw() }
    }

    pub fn memory(&self) -> &UserMemory {
        // SAFETY: a current process's memory is initialized.
        unsafe { self.data().memory.assume_init_ref() }
    }

    pub fn memory_mut(&mut self) -> &mut UserMemory {
        // SAFETY: ditto.
        unsafe { self.data_mut().memory.assume_init_mut() }
    }

    pub fn cwd(&self) -> &RcInode {
        // SAFETY: a current process's cwd is initialized.
        unsafe { self.data().cwd.assume_init_ref() }
    }

    pub fn trap_frame(&self) -> &arch::TrapFrame {
        // SAFETY: a current process's trapframe page is live.
        unsafe { &*self.data().trap_frame }
    }

    pub fn trap_frame_mut(&mut self) -> &mut arch::TrapFrame {
        // SAFETY: ditto.
        unsafe { &mut *self.data_mut().trap_frame }
    }

    /// Copy `src` to a user or kernel destination.
    ///
    /// # Safety
    ///
    /// A `CopyTarget::Kernel` pointer must be valid for `src.len()`
    /// bytes.
    pub unsafe fn either_copy_out(&mut self, dst: CopyTarget, src: &[u8]) -> Result<(), ()> {
        match dst {
            CopyTarget::User(addr) => self.memory_mut().copy_out_bytes(addr, src),
            CopyTarget::Kernel(dst) => {
                // SAFETY: the caller vouches for the destination.
                unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
                Ok(())
            }
        }
    }

    /// Copy from a user or kernel source into `dst`.
    ///
    /// # Safety
    ///
    /// A `CopySource::Kernel` pointer must be valid for `dst.len()`
    /// bytes.
    pub unsafe fn either_copy_in(&mut self, dst: &mut [u8], src: CopySource) -> Result<(), ()> {
        match src {
            CopySource::User(addr) => self.memory().copy_in_bytes(dst, addr),
            CopySource::Kernel(src) => {
                // SAFETY: the caller vouches for the source.
                unsafe { ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
                Ok(())
            }
        }
    }
}

/// The context of the current thread, or `None` when the CPU is in its
/// scheduler.
///
/// # Safety
///
/// At most one `KernelCtx` may exist per thread at a time.
pub unsafe fn current_ctx<'s>() -> Option<KernelCtx<'s>> {
    let proc = CPUS.current_proc();
    // SAFETY: a non-null current proc points into the static pool.
    let inner = unsafe { proc.as_ref() }?;
    Some(KernelCtx {
        kernel: kernel(),
        proc: CurrentProc { inner },
    })
}
