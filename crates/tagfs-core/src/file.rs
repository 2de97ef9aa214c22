//! Open-file handles and the per-process open-file table.
//!
//! spec.md §1 scopes the process abstraction and the syscall
//! argument-marshalling layer out of the core, narrowing the process down
//! to "the current process's working-directory inode and its open-file
//! descriptor table through a narrow interface" (§1) and the open-file
//! handle down to "type, pointer to an inode, current byte offset, and
//! independent readable/writable flags" (§3). [`Process`] and [`OpenFile`]
//! are that narrow interface: a minimal, concrete stand-in good enough to
//! drive `ops`/`tags` under test, grounded in `kernel::proc::ProcPrivateData`
//! (the `ofile`/`cwd` fields) and `kernel::file::{File, FileData}` (the
//! inode-backed variant only — pipes and devices are out of scope here).

use std::cell::Cell;

use bitflags::bitflags;
use tagfs_types::{FS_BLOCK_SIZE, InodeNo};

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::inode::Inode;
use crate::param::NOFILE;

bitflags! {
    /// `open` mode flags, named after spec.md §6's syscall constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct OpenFlags: i32 {
        const WRONLY = 0x001;
        const RDWR = 0x002;
        const CREATE = 0x200;
    }
}

impl OpenFlags {
    /// `O_RDONLY` is the all-zero-bits flag set, not a named bit — matching
    /// spec.md §6 (`O_RDONLY=0`).
    pub const RDONLY: Self = Self::empty();
}

/// An index into a [`Process`]'s open-file table.
pub type Fd = usize;

/// An inode-backed open file: the only kind this core's `Process`
/// represents. Pipes and device files are out of scope (spec.md §1).
pub struct OpenFile<'fs, D> {
    inode: Inode<'fs, D>,
    readable: bool,
    writable: bool,
    offset: Cell<u32>,
}

impl<'fs, D> OpenFile<'fs, D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    #[must_use]
    pub fn new(inode: Inode<'fs, D>, readable: bool, writable: bool) -> Self {
        Self {
            inode,
            readable,
            writable,
            offset: Cell::new(0),
        }
    }

    #[must_use]
    pub fn inode(&self) -> &Inode<'fs, D> {
        &self.inode
    }

    #[must_use]
    pub fn readable(&self) -> bool {
        self.readable
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset.get()
    }

    /// Reads at the file's current offset, advancing it by the number of
    /// bytes actually read.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize> {
        if !self.readable {
            return Err(Error::PermissionDenied);
        }
        let locked = self.inode.lock();
        let n = locked.read(self.offset.get(), dst)?;
        self.offset.set(self.offset.get() + u32::try_from(n).unwrap());
        Ok(n)
    }

    /// Writes at the file's current offset, advancing it by the number of
    /// bytes actually written.
    pub fn write(&self, src: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(Error::PermissionDenied);
        }
        let locked = self.inode.lock();
        let n = locked.write(self.offset.get(), src)?;
        self.offset.set(self.offset.get() + u32::try_from(n).unwrap());
        Ok(n)
    }
}

/// The narrow slice of process state the core needs: a working-directory
/// inode and a fixed-size open-file table.
pub struct Process<'fs, D> {
    cwd: InodeNo,
    ofile: [Option<OpenFile<'fs, D>>; NOFILE],
}

impl<'fs, D> Process<'fs, D> {
    /// Creates a process with no open files, rooted at `cwd`.
    #[must_use]
    pub fn new(cwd: InodeNo) -> Self {
        Self {
            cwd,
            ofile: std::array::from_fn(|_| None),
        }
    }

    #[must_use]
    pub fn cwd(&self) -> InodeNo {
        self.cwd
    }

    pub fn set_cwd(&mut self, cwd: InodeNo) {
        self.cwd = cwd;
    }

    /// Looks up an open file by descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadFileDescriptor`] if `fd` is out of range or the
    /// slot is empty.
    pub fn ofile(&self, fd: Fd) -> Result<&OpenFile<'fs, D>> {
        self.ofile
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(Error::BadFileDescriptor)
    }

    /// Installs `file` in the first free slot of the open-file table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFreeFileDescriptorTableEntry`] if every slot is
    /// occupied.
    pub fn add_ofile(&mut self, file: OpenFile<'fs, D>) -> Result<Fd> {
        let (fd, slot) = self
            .ofile
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(Error::NoFreeFileDescriptorTableEntry)?;
        *slot = Some(file);
        Ok(fd)
    }

    /// Removes and returns the file at `fd`, if any (the caller is
    /// responsible for dropping it, which releases the underlying inode
    /// reference).
    pub fn unset_ofile(&mut self, fd: Fd) -> Option<OpenFile<'fs, D>> {
        self.ofile.get_mut(fd)?.take()
    }
}
