//! File content mapping and I/O: `bmap`/`readi`/`writei`/`itrunc`.
//!
//! Grounded on `kernel::fs::inode::content` in the teacher, adapted to read
//! through `FileSystem::{read_block, write_block, alloc_block_with}`
//! instead of a global block cache, and extended with the tag-block
//! lifecycle (allocated lazily by the tag store, freed here alongside
//! regular data on truncate — see the open-question resolution in
//! `DESIGN.md`).

use tagfs_types::{
    BlockNo, FS_BLOCK_SIZE, IndirectBlock, NUM_DIRECT_REFS, NUM_INDIRECT_REFS, TagBlock,
};

use crate::device::BlockDevice;
use crate::error::{Error, Result};

use super::LockedInode;

const MAX_FILE: usize = NUM_DIRECT_REFS + NUM_INDIRECT_REFS;

impl<'fs, D> LockedInode<'fs, '_, D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    /// Returns the block number backing byte-range `[bn * FS_BLOCK_SIZE,
    /// (bn + 1) * FS_BLOCK_SIZE)` of this file's content, allocating one on
    /// demand if `alloc` is `true`.
    ///
    /// # Panics
    ///
    /// Panics if `bn` is out of range — a fatal, out-of-bounds `bmap` call
    /// indicates a programming bug, not something to recover from.
    fn bmap(&self, bn: usize, alloc: bool) -> Option<BlockNo> {
        assert!(bn < MAX_FILE, "bmap: out of range");

        if bn < NUM_DIRECT_REFS {
            return self.with_data(|d| d.addrs[bn]).or_else(|| {
                alloc.then(|| {
                    let fresh = self.fs().balloc();
                    self.with_data_mut(|d| d.addrs[bn] = Some(fresh));
                    fresh
                })
            });
        }

        let ibn = bn - NUM_DIRECT_REFS;
        let indirect_bn = self.with_data(|d| d.addrs[NUM_DIRECT_REFS]).or_else(|| {
            alloc.then(|| {
                let fresh = self.fs().alloc_block_with(&IndirectBlock::zeroed());
                self.with_data_mut(|d| d.addrs[NUM_DIRECT_REFS] = Some(fresh));
                fresh
            })
        })?;

        let mut indirect: IndirectBlock = self.fs().read_block(indirect_bn);
        if let Some(existing) = indirect.get(ibn) {
            return Some(existing);
        }
        if !alloc {
            return None;
        }
        let fresh = self.fs().balloc();
        indirect.set(ibn, Some(fresh));
        self.fs().write_block(indirect_bn, &indirect);
        Some(fresh)
    }

    /// Frees every data block, the indirect block, and the tag block this
    /// inode owns, and resets `size` to 0.
    pub(crate) fn truncate(&self) {
        for bn in 0..NUM_DIRECT_REFS {
            if let Some(addr) = self.with_data(|d| d.addrs[bn]) {
                self.fs().bfree(addr);
                self.with_data_mut(|d| d.addrs[bn] = None);
            }
        }

        if let Some(indirect_bn) = self.with_data(|d| d.addrs[NUM_DIRECT_REFS]) {
            let mut indirect: IndirectBlock = self.fs().read_block(indirect_bn);
            for addr in indirect.drain().flatten() {
                self.fs().bfree(addr);
            }
            self.fs().bfree(indirect_bn);
            self.with_data_mut(|d| d.addrs[NUM_DIRECT_REFS] = None);
        }

        if let Some(tag_bn) = self.with_data(|d| d.tags) {
            self.fs().bfree(tag_bn);
            self.with_data_mut(|d| d.tags = None);
        }

        self.with_data_mut(|d| d.size = 0);
        self.update();
    }

    /// Reads up to `n` bytes starting at `off` into `dst`, returning the
    /// number of bytes actually read.
    ///
    /// `off > size` and arithmetic overflow of `off + n` are both errors;
    /// `off + n > size` is silently clamped to `size` (the asymmetric
    /// clamping rules in the spec's design notes: `writei` extends the
    /// file to cover an out-of-range write, `readi` has nothing to extend,
    /// so it just stops at EOF).
    pub fn read(&self, off: u32, dst: &mut [u8]) -> Result<usize> {
        let size = self.size();
        if off > size {
            return Err(Error::InvalidArgument);
        }
        let n = u32::try_from(dst.len()).map_err(|_| Error::InvalidArgument)?;
        let end = off.checked_add(n).ok_or(Error::InvalidArgument)?.min(size);
        if end <= off {
            return Ok(0);
        }
        let want = (end - off) as usize;

        let mut read = 0usize;
        while read < want {
            let file_off = off as usize + read;
            let bn = file_off / FS_BLOCK_SIZE;
            let block_off = file_off % FS_BLOCK_SIZE;
            let Some(addr) = self.bmap(bn, false) else {
                break;
            };
            let block: [u8; FS_BLOCK_SIZE] = self.fs().read_block(addr);
            let chunk = (want - read).min(FS_BLOCK_SIZE - block_off);
            dst[read..read + chunk].copy_from_slice(&block[block_off..block_off + chunk]);
            read += chunk;
        }
        Ok(read)
    }

    /// Writes `src` at `off`, extending `size` if necessary.
    ///
    /// `off > size`, arithmetic overflow, or writing past `MAX_FILE *
    /// FS_BLOCK_SIZE` are all errors; otherwise `size` grows strictly
    /// monotonically to cover the write.
    pub fn write(&self, off: u32, src: &[u8]) -> Result<usize> {
        let size = self.size();
        if off > size {
            return Err(Error::InvalidArgument);
        }
        let n = u32::try_from(src.len()).map_err(|_| Error::InvalidArgument)?;
        let end = off.checked_add(n).ok_or(Error::InvalidArgument)?;
        let max = u32::try_from(MAX_FILE * FS_BLOCK_SIZE).unwrap();
        if end > max {
            return Err(Error::InvalidArgument);
        }

        let mut written = 0usize;
        while written < src.len() {
            let file_off = off as usize + written;
            let bn = file_off / FS_BLOCK_SIZE;
            let block_off = file_off % FS_BLOCK_SIZE;
            let Some(addr) = self.bmap(bn, true) else {
                break;
            };
            let mut block: [u8; FS_BLOCK_SIZE] = self.fs().read_block(addr);
            let chunk = (src.len() - written).min(FS_BLOCK_SIZE - block_off);
            block[block_off..block_off + chunk].copy_from_slice(&src[written..written + chunk]);
            self.fs().write_block(addr, &block);
            written += chunk;
        }

        if end > size {
            self.with_data_mut(|d| d.size = end);
        }
        self.update();
        Ok(written)
    }

    /// Returns the tag block, allocating a fresh one if none exists yet.
    pub(crate) fn tag_block_or_alloc(&self) -> BlockNo {
        if let Some(bn) = self.with_data(|d| d.tags) {
            return bn;
        }
        let bn = self.fs().alloc_block_with(&TagBlock::zeroed());
        self.with_data_mut(|d| d.tags = Some(bn));
        self.update();
        bn
    }

    /// Returns the tag block, if one has been allocated.
    #[must_use]
    pub(crate) fn tag_block(&self) -> Option<BlockNo> {
        self.with_data(|d| d.tags)
    }
}
