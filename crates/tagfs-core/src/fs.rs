//! The mounted file system: super block, block cache, inode cache.
//!
//! The teacher kernel keeps a single boot-time instance of each of these
//! behind `static SUPER_BLOCK: OnceInit<SuperBlock>` and
//! `static INODE_TABLE: SpinLock<[...; NINODE]>` (see `kernel::fs`). This
//! port collects the same pieces into one [`FileSystem`] value instead, so a
//! host process (or a test) can mount more than one image at a time.

use std::sync::Mutex;

use block_io::{BlockData, BlockIoCache, BufferList};
use tagfs_types::{
    BITS_PER_BLOCK, BmapBlock, BlockNo, FS_BLOCK_SIZE, INODE_PER_BLOCK, InodeBlock, InodeNo,
    NUM_DIRECT_REFS, SuperBlock, T_DIR,
};

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::inode::{Inode, InodeData, InodeTable};
use crate::param::NBUF;

pub(crate) type Cache<D> = BlockIoCache<D, Mutex<BufferList<Mutex<BlockData<FS_BLOCK_SIZE>>>>>;

/// A mounted file system backed by a block device `D`.
pub struct FileSystem<D> {
    pub(crate) cache: Cache<D>,
    pub(crate) sb: SuperBlock,
    pub(crate) inodes: InodeTable,
}

impl<D> FileSystem<D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    /// Mounts an already-formatted image, validating the super block magic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the super block cannot be read, or
    /// [`Error::InvalidArgument`] if its magic number does not match.
    pub fn mount(device: D) -> Result<Self> {
        let cache = Cache::<D>::new(device);
        cache.init(NBUF);

        let sb = {
            let mut handle = cache.get(SuperBlock::SUPER_BLOCK_NO.as_index());
            let guard = handle.lock().read().map_err(|_| Error::Io)?;
            let sb: &SuperBlock = guard.data();
            if sb.magic != SuperBlock::FS_MAGIC {
                return Err(Error::InvalidArgument);
            }
            SuperBlock {
                magic: sb.magic,
                size: sb.size,
                nblocks: sb.nblocks,
                ninodes: sb.ninodes,
                inodestart: sb.inodestart,
                bmapstart: sb.bmapstart,
            }
        };

        Ok(Self {
            cache,
            sb,
            inodes: InodeTable::new(),
        })
    }

    /// Builds a brand-new, empty file system image of `size` blocks with
    /// room for `ninodes` inodes, and mounts it.
    ///
    /// This is the host-side equivalent of `mkfs`: it has no counterpart in
    /// the teacher kernel (which always boots from a pre-built image), but
    /// is necessary here since nothing else can produce one.
    ///
    /// # Panics
    ///
    /// Panics if `size` is too small to hold the boot/super/inode/bitmap
    /// regions plus at least one data block.
    pub fn format(device: D, size: u32, ninodes: u32) -> Result<Self> {
        let ninodeblocks = u32::try_from(ninodes as usize).unwrap().div_ceil(
            u32::try_from(INODE_PER_BLOCK).unwrap(),
        );
        let nbitmapblocks = size.div_ceil(u32::try_from(BITS_PER_BLOCK).unwrap());
        let inodestart = 2;
        let bmapstart = inodestart + ninodeblocks;
        let datastart = bmapstart + nbitmapblocks;
        assert!(datastart < size, "image too small for its own metadata");

        let sb = SuperBlock {
            magic: SuperBlock::FS_MAGIC,
            size,
            nblocks: size - datastart,
            ninodes,
            inodestart,
            bmapstart,
        };

        let cache = Cache::<D>::new(device);
        cache.init(NBUF);

        for bn in 0..size {
            let mut handle = cache.get(bn as usize);
            let mut guard = handle.lock().zeroed();
            if bn == SuperBlock::SUPER_BLOCK_NO.value() {
                *guard.data_mut::<SuperBlock>() = SuperBlock {
                    magic: sb.magic,
                    size: sb.size,
                    nblocks: sb.nblocks,
                    ninodes: sb.ninodes,
                    inodestart: sb.inodestart,
                    bmapstart: sb.bmapstart,
                };
            }
            guard.write().map_err(|_| Error::Io)?;
        }

        let fs = Self {
            cache,
            sb,
            inodes: InodeTable::new(),
        };

        for bn in 0..datastart {
            fs.mark_allocated(BlockNo::new(bn));
        }

        fs.write_dinode(InodeNo::ROOT, &InodeData {
            ty: T_DIR,
            major: 0,
            minor: 0,
            nlink: 1,
            size: 0,
            addrs: [None; NUM_DIRECT_REFS + 1],
            tags: None,
        });

        // The root directory is its own parent (spec.md §3: "The root
        // directory has `..` pointing to itself"), and like every other
        // directory it carries its own `.` entry too.
        {
            let root = Inode::get(&fs, InodeNo::ROOT);
            let locked = root.lock();
            locked.link(b".", InodeNo::ROOT).expect("root \".\" link");
            locked.link(b"..", InodeNo::ROOT).expect("root \"..\" link");
        }

        Ok(fs)
    }

    /// Allocates a free data block, zeroes it, and returns its number.
    ///
    /// # Panics
    ///
    /// Panics if the device has no free blocks left — a fatal condition per
    /// the error handling design (`balloc` with no free block is a
    /// programming-level invariant violation, not something callers can
    /// recover from).
    pub(crate) fn balloc(&self) -> BlockNo {
        for b in (0..self.sb.size).step_by(BITS_PER_BLOCK) {
            let bmap_bn = self.sb.bmap_block(b as usize);
            let mut handle = self.cache.get(bmap_bn.as_index());
            let mut guard = handle.lock().read().unwrap_or_else(|_| panic!("balloc: read failed"));
            let bmap: &mut BmapBlock = guard.data_mut();
            for bi in 0..BITS_PER_BLOCK {
                let bn = b as usize + bi;
                if bn >= self.sb.size as usize {
                    break;
                }
                if !bmap.is_allocated(bi) {
                    bmap.allocate(bi);
                    guard.write().unwrap_or_else(|_| panic!("balloc: write failed"));
                    self.zero_block(BlockNo::new(u32::try_from(bn).unwrap()));
                    return BlockNo::new(u32::try_from(bn).unwrap());
                }
            }
        }
        log::error!("balloc: out of blocks");
        panic!("balloc: out of blocks");
    }

    /// Marks a block allocated in the bitmap without zeroing it (used while
    /// building a fresh image, where the boot/super/inode/bitmap regions
    /// must never be handed out by `balloc`).
    fn mark_allocated(&self, bn: BlockNo) {
        let bmap_bn = self.sb.bmap_block(bn.as_index());
        let mut handle = self.cache.get(bmap_bn.as_index());
        let mut guard = handle.lock().read().unwrap_or_else(|_| panic!("mark_allocated: read failed"));
        let bmap: &mut BmapBlock = guard.data_mut();
        bmap.allocate(bn.as_index() % BITS_PER_BLOCK);
        guard.write().unwrap_or_else(|_| panic!("mark_allocated: write failed"));
    }

    /// Frees a previously allocated data block.
    ///
    /// # Panics
    ///
    /// Panics if the block was not marked allocated (a double-free, which
    /// per the error handling design is a fatal corruption signal).
    pub(crate) fn bfree(&self, bn: BlockNo) {
        let bmap_bn = self.sb.bmap_block(bn.as_index());
        let mut handle = self.cache.get(bmap_bn.as_index());
        let mut guard = handle.lock().read().unwrap_or_else(|_| panic!("bfree: read failed"));
        let bmap: &mut BmapBlock = guard.data_mut();
        let bit = bn.as_index() % BITS_PER_BLOCK;
        if !bmap.is_allocated(bit) {
            log::error!("bfree: freeing free block {bn}");
        }
        assert!(bmap.is_allocated(bit), "freeing free block");
        bmap.free(bit);
        guard.write().unwrap_or_else(|_| panic!("bfree: write failed"));
    }

    fn zero_block(&self, bn: BlockNo) {
        let mut handle = self.cache.get(bn.as_index());
        let mut guard = handle.lock().zeroed();
        guard.write().unwrap_or_else(|_| panic!("zero_block: write failed"));
    }

    pub(crate) fn read_dinode(&self, ino: InodeNo) -> InodeData {
        let bn = self.sb.inode_block(ino);
        let mut handle = self.cache.get(bn.as_index());
        let guard = handle.lock().read().unwrap_or_else(|_| panic!("read_dinode: read failed"));
        let block: &InodeBlock = guard.data();
        let dinode = block.inode(ino);
        let mut addrs = [None; NUM_DIRECT_REFS + 1];
        dinode.read_addrs(&mut addrs);
        InodeData {
            ty: dinode.ty,
            major: dinode.major,
            minor: dinode.minor,
            nlink: dinode.nlink,
            size: dinode.size,
            addrs,
            tags: dinode.tag_block(),
        }
    }

    pub(crate) fn write_dinode(&self, ino: InodeNo, data: &InodeData) {
        let bn = self.sb.inode_block(ino);
        let mut handle = self.cache.get(bn.as_index());
        let mut guard = handle.lock().read().unwrap_or_else(|_| panic!("write_dinode: read failed"));
        let block: &mut InodeBlock = guard.data_mut();
        let dinode = block.inode_mut(ino);
        dinode.ty = data.ty;
        dinode.major = data.major;
        dinode.minor = data.minor;
        dinode.nlink = data.nlink;
        dinode.size = data.size;
        dinode.write_addrs(&data.addrs);
        dinode.set_tag_block(data.tags);
        guard.write().unwrap_or_else(|_| panic!("write_dinode: write failed"));
    }

    /// Reads a raw data block as a POD type `T`.
    pub(crate) fn read_block<T: dataview::Pod>(&self, bn: BlockNo) -> T {
        let mut handle = self.cache.get(bn.as_index());
        let guard = handle.lock().read().unwrap_or_else(|_| panic!("read_block: read failed"));
        *guard.data::<T>()
    }

    /// Writes a raw data block from a POD type `T`.
    pub(crate) fn write_block<T: dataview::Pod>(&self, bn: BlockNo, value: &T) {
        let mut handle = self.cache.get(bn.as_index());
        let mut guard = handle.lock().read().unwrap_or_else(|_| panic!("write_block: read failed"));
        *guard.data_mut::<T>() = *value;
        guard.write().unwrap_or_else(|_| panic!("write_block: write failed"));
    }

    /// Allocates a zeroed block and initializes it from `value`.
    pub(crate) fn alloc_block_with<T: dataview::Pod>(&self, value: &T) -> BlockNo {
        let bn = self.balloc();
        self.write_block(bn, value);
        bn
    }

    /// Returns the root directory's inode number.
    #[must_use]
    pub fn root_ino(&self) -> InodeNo {
        InodeNo::ROOT
    }
}
