//! Inode allocation, caching, and locking.
//!
//! Grounded on `kernel::fs::inode::mod` in the teacher: a fixed-size cache
//! of inode slots, a short critical section for identity/refcount, and a
//! sleepable exclusion over contents held across disk I/O. The teacher
//! generalizes every inode handle over a `Tx`/`READ_ONLY` journal
//! transaction; this port has no journal, so the `FileSystem` reference
//! itself stands in for the transaction.

pub mod content;
pub mod directory;

use std::sync::Mutex;

use tagfs_types::{BlockNo, FS_BLOCK_SIZE, InodeNo, NUM_DIRECT_REFS, T_DIR, T_FILE};

use crate::device::BlockDevice;
use crate::fs::FileSystem;
use crate::param::NINODE;
use crate::sync::SleepLock;

/// In-memory copy of an inode's disk fields, valid only while the owning
/// slot's content lock is held.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InodeData {
    pub ty: u16,
    pub major: u16,
    pub minor: u16,
    pub nlink: u16,
    pub size: u32,
    pub addrs: [Option<BlockNo>; NUM_DIRECT_REFS + 1],
    pub tags: Option<BlockNo>,
}

struct Identity {
    ino: InodeNo,
    refcount: usize,
}

pub(crate) struct InodeTable {
    slots: Mutex<[Option<Identity>; NINODE]>,
    content_locks: Vec<SleepLock>,
    content_data: Vec<Mutex<Option<InodeData>>>,
}

impl InodeTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(std::array::from_fn(|_| None)),
            content_locks: (0..NINODE).map(|_| SleepLock::new()).collect(),
            content_data: (0..NINODE).map(|_| Mutex::new(None)).collect(),
        }
    }
}

/// A reference-counted handle to a cached inode.
///
/// Dropping the last handle to an inode with `nlink == 0` truncates and
/// frees it, mirroring `Drop for TxInode` in the teacher.
pub struct Inode<'fs, D> {
    fs: &'fs FileSystem<D>,
    slot: usize,
    ino: InodeNo,
}

impl<D> std::fmt::Debug for Inode<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inode").field("ino", &self.ino).finish()
    }
}

impl<'fs, D> Inode<'fs, D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    /// Returns a cached handle to `ino`, bumping its reference count (or
    /// allocating a fresh cache slot and lazily reading nothing yet — the
    /// contents are only read the first time someone locks the inode).
    ///
    /// # Panics
    ///
    /// Panics if every cache slot is in use (`NINODE` inodes referenced at
    /// once), mirroring the teacher's "no inodes" fatal condition.
    #[must_use]
    pub(crate) fn get(fs: &'fs FileSystem<D>, ino: InodeNo) -> Self {
        let mut slots = fs.inodes.slots.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((slot, id)) = slots
            .iter_mut()
            .enumerate()
            .find_map(|(i, s)| s.as_mut().filter(|id| id.ino == ino).map(|id| (i, id)))
        {
            id.refcount += 1;
            return Self { fs, slot, ino };
        }

        let free = slots
            .iter()
            .position(|s| s.as_ref().is_none_or(|id| id.refcount == 0));
        let Some(slot) = free else {
            log::error!("inode cache exhausted: no inodes");
            panic!("inode cache exhausted: no inodes");
        };
        slots[slot] = Some(Identity { ino, refcount: 1 });
        drop(slots);
        *fs.inodes.content_data[slot]
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
        Self { fs, slot, ino }
    }

    /// Allocates a fresh on-disk inode of type `ty` and returns a cache
    /// handle to it.
    ///
    /// # Panics
    ///
    /// Panics if no free inode exists on disk (fatal, per the error
    /// handling design: `ialloc` with no free inode is a programming-level
    /// invariant violation).
    pub(crate) fn alloc(fs: &'fs FileSystem<D>, ty: u16) -> Self {
        for i in 1..fs.sb.ninodes {
            let ino = InodeNo::new(i);
            let data = fs.read_dinode(ino);
            if data.ty == 0 {
                let fresh = InodeData {
                    ty,
                    major: 0,
                    minor: 0,
                    nlink: 0,
                    size: 0,
                    addrs: [None; NUM_DIRECT_REFS + 1],
                    tags: None,
                };
                fs.write_dinode(ino, &fresh);
                return Self::get(fs, ino);
            }
        }
        log::error!("ialloc: no free inodes");
        panic!("ialloc: no free inodes");
    }

    /// Returns another handle to the same cached inode, bumping the
    /// refcount.
    #[must_use]
    pub fn dup(&self) -> Self {
        let mut slots = self.fs.inodes.slots.lock().unwrap_or_else(|e| e.into_inner());
        let id = slots[self.slot].as_mut().expect("inode slot identity missing");
        assert_eq!(id.ino, self.ino);
        id.refcount += 1;
        Self {
            fs: self.fs,
            slot: self.slot,
            ino: self.ino,
        }
    }

    /// Returns the inode number this handle refers to.
    #[must_use]
    pub fn ino(&self) -> InodeNo {
        self.ino
    }

    /// Locks the inode's contents, reading them from disk the first time.
    #[must_use]
    pub fn lock(&self) -> LockedInode<'fs, '_, D> {
        let guard = self.fs.inodes.content_locks[self.slot].lock();
        {
            let mut data = self.fs.inodes.content_data[self.slot]
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if data.is_none() {
                *data = Some(self.fs.read_dinode(self.ino));
            }
        }
        LockedInode {
            inode: self,
            _guard: guard,
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.lock().ty() == T_DIR
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.lock().ty() == T_FILE
    }
}

impl<D> Drop for Inode<'_, D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    fn drop(&mut self) {
        let destroy = {
            let mut slots = self.fs.inodes.slots.lock().unwrap_or_else(|e| e.into_inner());
            let id = slots[self.slot].as_mut().expect("inode slot identity missing");
            assert_eq!(id.ino, self.ino);
            id.refcount -= 1;
            id.refcount == 0
        };
        if !destroy {
            return;
        }

        // Suspension inside destruction: truncation performs disk I/O, so it
        // must happen without the cache-wide `slots` lock held.
        let locked = self.lock();
        if locked.nlink() == 0 {
            locked.truncate();
            locked.free();
        }
    }
}

/// A locked inode: exclusive access to its contents, lazily read from disk.
pub struct LockedInode<'fs, 'i, D> {
    inode: &'i Inode<'fs, D>,
    _guard: crate::sync::SleepLockGuard<'i>,
}

impl<'fs, D> LockedInode<'fs, '_, D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    fn fs(&self) -> &'fs FileSystem<D> {
        self.inode.fs
    }

    fn with_data<R>(&self, f: impl FnOnce(&InodeData) -> R) -> R {
        let data = self.fs().inodes.content_data[self.inode.slot]
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        f(data.as_ref().expect("locked inode has no cached data"))
    }

    fn with_data_mut<R>(&self, f: impl FnOnce(&mut InodeData) -> R) -> R {
        let mut data = self.fs().inodes.content_data[self.inode.slot]
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        f(data.as_mut().expect("locked inode has no cached data"))
    }

    #[must_use]
    pub fn ino(&self) -> InodeNo {
        self.inode.ino
    }

    #[must_use]
    pub fn ty(&self) -> u16 {
        self.with_data(|d| d.ty)
    }

    #[must_use]
    pub fn nlink(&self) -> u16 {
        self.with_data(|d| d.nlink)
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.with_data(|d| d.size)
    }

    #[must_use]
    pub fn major(&self) -> u16 {
        self.with_data(|d| d.major)
    }

    #[must_use]
    pub fn minor(&self) -> u16 {
        self.with_data(|d| d.minor)
    }

    /// Sets type/major/minor/nlink/size in one shot and writes the inode
    /// back to disk.
    pub fn init_metadata(&self, ty: u16, major: u16, minor: u16, nlink: u16) {
        self.with_data_mut(|d| {
            d.ty = ty;
            d.major = major;
            d.minor = minor;
            d.nlink = nlink;
        });
        self.update();
    }

    pub fn set_nlink(&self, nlink: u16) {
        self.with_data_mut(|d| d.nlink = nlink);
        self.update();
    }

    /// Writes the cached contents back to disk.
    pub fn update(&self) {
        let data = self.with_data(|d| *d);
        self.fs().write_dinode(self.inode.ino, &data);
    }

    /// Clears the inode to the free state and forgets the cached copy, so
    /// the next lock of a recycled slot re-reads from disk.
    pub(crate) fn free(&self) {
        self.with_data_mut(|d| {
            d.ty = 0;
            d.nlink = 0;
            d.size = 0;
            d.addrs = [None; NUM_DIRECT_REFS + 1];
            d.tags = None;
        });
        self.update();
    }
}
