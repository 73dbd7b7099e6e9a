/// Maximum number of processes.
pub const NPROC: usize = 64;

/// Maximum number of CPUs.
pub const NCPU: usize = 8;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Open files per system.
pub const NFILE: usize = 100;

/// Maximum number of in-memory inodes.
pub const NINODE: usize = 50;

/// Device number of file system root disk.
pub const ROOTDEV: u32 = 1;

/// Maximum length of process name.
pub const MAXPROCNAME: usize = 16;

/// Pages in the arena handed to the page allocator at boot.
pub const NPAGE: usize = 320;

/// Pages of user address space one process may map.
pub const USERPAGES: usize = 32;
