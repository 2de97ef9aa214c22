//! Directory content: entry lookup and linking.
//!
//! Grounded on `kernel::fs::inode::directory` in the teacher. Entries are
//! fixed-size [`DirEntry`] records scanned linearly; unused slots are
//! recognized by a zero inode number.

use dataview::PodMethods as _;
use tagfs_types::{DIR_SIZE, DirEntry, FS_BLOCK_SIZE, InodeNo, T_DIR};

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::inode::Inode;

use super::LockedInode;

impl<'fs, D> LockedInode<'fs, '_, D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    /// Returns `true` if this directory has no entries besides `.` and
    /// `..`.
    ///
    /// # Panics
    ///
    /// Panics if called on a non-directory inode.
    #[must_use]
    pub fn is_empty_dir(&self) -> bool {
        assert_eq!(self.ty(), T_DIR);
        let size = self.size() as usize;
        let mut buf = [0u8; size_of::<DirEntry>()];
        let mut off = 2 * size_of::<DirEntry>();
        while off < size {
            let n = self.read(u32::try_from(off).unwrap(), &mut buf).unwrap_or(0);
            assert_eq!(n, buf.len(), "directory read short during scan");
            let entry: &DirEntry = buf.as_data_view().get(0);
            if entry.ino().is_some() {
                return false;
            }
            off += buf.len();
        }
        true
    }

    /// Looks up `name` among this directory's entries.
    ///
    /// Returns the matching inode (as a fresh cache handle) and the byte
    /// offset of its directory entry, or `None` if not present.
    ///
    /// # Panics
    ///
    /// Panics if called on a non-directory inode.
    #[must_use]
    pub fn lookup(&self, name: &[u8]) -> Option<(Inode<'fs, D>, u32)> {
        assert_eq!(self.ty(), T_DIR);
        let size = self.size();
        let mut buf = [0u8; size_of::<DirEntry>()];
        let mut off = 0u32;
        while off < size {
            let n = self.read(off, &mut buf).unwrap_or(0);
            assert_eq!(n, buf.len(), "directory read short during scan");
            let entry: &DirEntry = buf.as_data_view().get(0);
            if let Some(ino) = entry.ino() {
                if entry.is_same_name(name) {
                    return Some((Inode::get(self.fs(), ino), off));
                }
            }
            off += u32::try_from(buf.len()).unwrap();
        }
        None
    }

    /// Adds a `(name, ino)` entry to this directory, reusing the first free
    /// slot if one exists or appending otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if `name` is already present, or
    /// [`Error::InvalidArgument`] if `name` is empty or longer than
    /// [`DIR_SIZE`].
    ///
    /// # Panics
    ///
    /// Panics if called on a non-directory inode.
    pub fn link(&self, name: &[u8], ino: InodeNo) -> Result<()> {
        assert_eq!(self.ty(), T_DIR);
        if name.is_empty() || name.len() > DIR_SIZE {
            return Err(Error::InvalidArgument);
        }
        if self.lookup(name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let size = self.size();
        let mut buf = [0u8; size_of::<DirEntry>()];
        let mut off = 0u32;
        let mut free_off = None;
        while off < size {
            let n = self.read(off, &mut buf).unwrap_or(0);
            assert_eq!(n, buf.len(), "directory read short during scan");
            let entry: &DirEntry = buf.as_data_view().get(0);
            if entry.ino().is_none() {
                free_off = Some(off);
                break;
            }
            off += u32::try_from(buf.len()).unwrap();
        }
        let write_off = free_off.unwrap_or(size);

        let mut entry_bytes = [0u8; size_of::<DirEntry>()];
        let entry: &mut DirEntry = entry_bytes.as_data_view_mut().get_mut(0);
        entry.set_ino(Some(ino));
        entry.set_name(name);
        self.write(write_off, &entry_bytes)?;
        Ok(())
    }
}
