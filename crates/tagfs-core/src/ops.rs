//! Higher-level file operations: `link`, `unlink`, `create`, `open`.
//!
//! Grounded in `kernel::fs::ops` (`link`/`unlink`/`create`) and
//! `kernel::file::inode::new_file` (`open`'s `readable`/`writable` split),
//! generalized over a plain [`FileSystem`] reference instead of a log
//! transaction (spec.md §1's journaling non-goal — see `DESIGN.md`) and a
//! [`Process`] instead of `ProcPrivateData`.
//!
//! Ordering matters here, per spec.md §5: wherever a parent and a child
//! inode are both locked, the parent is always locked first, mirroring the
//! teacher's own `unlink`/`create` — a consistent parent-before-child order
//! is what avoids the lock-order cycle spec.md §9 warns about.

use tagfs_types::{DirEntry, FS_BLOCK_SIZE, InodeNo, T_DEVICE, T_DIR, T_FILE};

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::file::{Fd, OpenFile, OpenFlags, Process};
use crate::fs::FileSystem;
use crate::inode::Inode;

/// Resolves `old_path` and adds `new_path` as another directory entry
/// pointing at the same inode.
///
/// # Errors
///
/// - [`Error::NotFound`] if either path cannot be resolved.
/// - [`Error::IsADirectory`] if `old_path` names a directory (spec.md §1:
///   no hard links to directories).
/// - [`Error::NotADirectory`] if `new_path`'s parent is not a directory.
/// - [`Error::AlreadyExists`] if `new_path` already names an entry.
pub fn link<D>(fs: &FileSystem<D>, cwd: InodeNo, old_path: &[u8], new_path: &[u8]) -> Result<()>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    let old = fs.resolve(old_path, cwd)?;
    {
        let old_locked = old.lock();
        if old_locked.ty() == T_DIR {
            return Err(Error::IsADirectory);
        }
    }

    let (parent, name) = fs.resolve_parent(new_path, cwd)?;
    let parent_locked = parent.lock();
    if parent_locked.ty() != T_DIR {
        return Err(Error::NotADirectory);
    }
    // spec.md §4.6 also rejects a link whose parent lives on a different
    // device; this core mounts exactly one device (spec.md §1's
    // multi-device non-goal), so that case can never arise here.
    parent_locked.link(name, old.ino())?;
    drop(parent_locked);

    let old_locked = old.lock();
    old_locked.set_nlink(old_locked.nlink() + 1);
    Ok(())
}

/// Removes the directory entry named by `path`.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if the final element is `.` or `..`.
/// - [`Error::NotFound`] if `path` does not resolve to an existing entry.
/// - [`Error::DirectoryNotEmpty`] if the target is a non-empty directory.
///
/// # Panics
///
/// Panics if the target inode's `nlink` is already `0` before the
/// decrement — a broken link-count invariant, per spec.md §8.
pub fn unlink<D>(fs: &FileSystem<D>, cwd: InodeNo, path: &[u8]) -> Result<()>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    let (parent, name) = fs.resolve_parent(path, cwd)?;
    if name == b"." || name == b".." {
        return Err(Error::InvalidArgument);
    }

    let parent_locked = parent.lock();
    if parent_locked.ty() != T_DIR {
        return Err(Error::NotADirectory);
    }
    let (child, off) = parent_locked.lookup(name).ok_or(Error::NotFound)?;
    let child_locked = child.lock();

    assert!(child_locked.nlink() > 0, "unlink: nlink underflow");
    if child_locked.ty() == T_DIR && !child_locked.is_empty_dir() {
        return Err(Error::DirectoryNotEmpty);
    }

    let zero = [0u8; size_of::<DirEntry>()];
    parent_locked.write(off, &zero)?;

    if child_locked.ty() == T_DIR {
        // decrement the parent's ".." reference.
        parent_locked.set_nlink(parent_locked.nlink() - 1);
    }
    child_locked.set_nlink(child_locked.nlink() - 1);

    Ok(())
}

/// Resolves `path`'s parent and either returns the existing entry
/// (idempotent open-for-create, when the existing entry is a regular file
/// or device node and `ty` is [`T_FILE`]) or allocates a fresh inode of
/// type `ty`, links it into the parent, and returns it.
///
/// # Errors
///
/// - [`Error::NotFound`]/[`Error::NotADirectory`] from path resolution.
/// - [`Error::AlreadyExists`] if the name exists with an incompatible type.
pub fn create<'fs, D>(
    fs: &'fs FileSystem<D>,
    cwd: InodeNo,
    path: &[u8],
    ty: u16,
    major: u16,
    minor: u16,
) -> Result<Inode<'fs, D>>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    let (parent, name) = fs.resolve_parent(path, cwd)?;
    let parent_locked = parent.lock();
    if parent_locked.ty() != T_DIR {
        return Err(Error::NotADirectory);
    }

    if let Some((child, _off)) = parent_locked.lookup(name) {
        let child_locked = child.lock();
        if ty == T_FILE && matches!(child_locked.ty(), T_FILE | T_DEVICE) {
            drop(child_locked);
            return Ok(child);
        }
        return Err(Error::AlreadyExists);
    }

    let child = Inode::alloc(fs, ty);
    let child_locked = child.lock();
    child_locked.init_metadata(ty, major, minor, 0);

    if ty == T_DIR {
        // "." does not bump its own nlink (spec.md §9: avoids a reference
        // cycle); ".." does, corrected below once the link into the parent
        // is guaranteed to succeed.
        child_locked.link(b".", child.ino())?;
        child_locked.link(b"..", parent.ino())?;
    }

    parent_locked.link(name, child.ino())?;

    if ty == T_DIR {
        parent_locked.set_nlink(parent_locked.nlink() + 1);
    }
    child_locked.set_nlink(1);

    drop(child_locked);
    Ok(child)
}

/// Opens `path` as described by `flags`, installing the result in `proc`'s
/// open-file table.
///
/// # Errors
///
/// - Everything [`create`]/[`FileSystem::resolve`] can return.
/// - [`Error::DirectoryNotWritable`] if a directory is opened with a
///   writable mode.
/// - [`Error::NoFreeFileDescriptorTableEntry`] if `proc`'s table is full.
pub fn open<'fs, D>(
    fs: &'fs FileSystem<D>,
    proc: &mut Process<'fs, D>,
    path: &[u8],
    flags: OpenFlags,
) -> Result<Fd>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    let writable = flags.intersects(OpenFlags::WRONLY | OpenFlags::RDWR);
    let readable = !flags.contains(OpenFlags::WRONLY);

    let ip = if flags.contains(OpenFlags::CREATE) {
        create(fs, proc.cwd(), path, T_FILE, 0, 0)?
    } else {
        let ip = fs.resolve(path, proc.cwd())?;
        let locked = ip.lock();
        if locked.ty() == T_DIR && writable {
            return Err(Error::DirectoryNotWritable);
        }
        drop(locked);
        ip
    };

    let file = OpenFile::new(ip, readable, writable);
    proc.add_ofile(file)
}
