//! The core of `tagfs`: block allocator, inode cache and locking, directory
//! layer, path resolver, higher-level file operations, and the per-file tag
//! store.
//!
//! The crate is organized along the same seams the teacher kernel uses
//! (`kernel::fs`), minus the log/transaction layer it wraps every mutation
//! in — see `DESIGN.md` for why that layer is not ported. Everything here
//! talks directly to a [`device::BlockDevice`] through [`fs::FileSystem`].

pub mod device;
pub mod error;
pub mod file;
mod fs;
pub mod inode;
pub mod ops;
pub mod param;
mod path;
pub mod stat;
pub mod sync;
pub mod tags;

pub use error::{Error, Result};
pub use fs::FileSystem;
pub use inode::{Inode, LockedInode};
pub use stat::Stat;
