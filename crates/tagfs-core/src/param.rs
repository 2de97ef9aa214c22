//! Compile-time file system parameters.

/// Maximum number of open files a single [`crate::FileSystem`] will track.
pub const NOFILE: usize = 16;

/// Maximum number of in-memory inode cache slots.
pub const NINODE: usize = 50;

/// Maximum number of blocks held open by the block I/O cache at once.
///
/// Must be at least `NINODE` plus a handful of transient buffers used while
/// walking indirect blocks and directories.
pub const NBUF: usize = NINODE + 8;
