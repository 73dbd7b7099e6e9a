//! User address-space layout.
//!
//! Address zero first:
//!   text
//!   original data and bss
//!   fixed-size stack
//!   expandable heap
//!   ...
//!   TRAPFRAME (p->trap_frame, used by the trampoline)
//!   TRAMPOLINE (the same page as in the kernel)

/// Bytes per page.
pub const PGSIZE: usize = 4096;

/// One beyond the highest possible virtual address.
/// MAXVA is actually one bit less than the max allowed by
/// Sv39, to avoid having to sign-extend virtual addresses
/// that have the high bit set.
pub const MAXVA: usize = 1 << (9 + 9 + 9 + 12 - 1);

/// The trampoline page, mapped at the highest user virtual address.
/// Only the supervisor uses it, on the way to/from user space.
pub const TRAMPOLINE: usize = MAXVA - PGSIZE;

/// The trapframe page, just below the trampoline.
pub const TRAPFRAME: usize = TRAMPOLINE - PGSIZE;
