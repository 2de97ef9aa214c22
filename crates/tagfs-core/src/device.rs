//! Block device abstraction.
//!
//! The teacher kernel's `fs::block_io` wires a `VirtioDiskDevice` into the
//! global block cache; there is no hardware to talk to here, so this module
//! provides [`MemBlockDevice`], a plain in-memory backing store, alongside
//! the re-exported [`BlockDevice`] trait the cache is generic over.

use std::sync::Mutex;

use tagfs_types::FS_BLOCK_SIZE;

pub use block_io::BlockDevice;

/// An in-memory block device, useful for tests and for building a file
/// system image entirely in memory.
pub struct MemBlockDevice {
    blocks: Mutex<Vec<[u8; FS_BLOCK_SIZE]>>,
}

impl MemBlockDevice {
    /// Creates a device with `num_blocks` zeroed blocks.
    #[must_use]
    pub fn new(num_blocks: usize) -> Self {
        Self {
            blocks: Mutex::new(vec![[0; FS_BLOCK_SIZE]; num_blocks]),
        }
    }

    /// Returns the number of blocks backing this device.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A device I/O error.
///
/// `MemBlockDevice` only fails on an out-of-range access; real backing
/// stores would plug their own error type into [`BlockDevice::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("block index out of range")]
pub struct OutOfRange;

impl BlockDevice<FS_BLOCK_SIZE> for MemBlockDevice {
    type Error = OutOfRange;

    fn read(&self, index: usize, data: &mut [u8; FS_BLOCK_SIZE]) -> Result<(), Self::Error> {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        let block = blocks.get(index).ok_or(OutOfRange)?;
        data.copy_from_slice(block);
        Ok(())
    }

    fn write(&self, index: usize, data: &[u8; FS_BLOCK_SIZE]) -> Result<(), Self::Error> {
        let mut blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        let block = blocks.get_mut(index).ok_or(OutOfRange)?;
        block.copy_from_slice(data);
        Ok(())
    }
}
