//! `fstat`-style inode metadata snapshot.
//!
//! Not named in spec.md directly, but required by its own testable
//! properties (scenario 4 compares two paths' reported inode numbers after
//! `link`) — carried forward from `kernel::fs::stat::Stat` /
//! `kernel::fs::inode::mod::stat()`.

use tagfs_types::{FS_BLOCK_SIZE, InodeNo};

use crate::device::BlockDevice;
use crate::inode::LockedInode;

/// A snapshot of an inode's metadata, as returned by `fstat`.
///
/// `dev` is always `0`: this core mounts a single device (see spec.md §1's
/// "multi-device namespacing" non-goal), so there is no device identity
/// beyond the one [`crate::FileSystem`] a caller is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub dev: u32,
    pub ino: InodeNo,
    pub ty: u16,
    pub nlink: u16,
    pub size: u32,
}

impl<D> LockedInode<'_, '_, D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    /// Returns a metadata snapshot of this locked inode.
    #[must_use]
    pub fn stat(&self) -> Stat {
        Stat {
            dev: 0,
            ino: self.ino(),
            ty: self.ty(),
            nlink: self.nlink(),
            size: self.size(),
        }
    }
}
