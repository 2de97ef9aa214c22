//! Recoverable error conditions.
//!
//! Every variant here corresponds to a condition that a caller can run into
//! during ordinary use and that must be reported back rather than crash the
//! process. Anything that indicates on-disk corruption or a broken
//! invariant (an out-of-range `bmap`, `balloc` finding no free block, a lock
//! protocol violation, ...) is instead a `panic!` deep in the implementation
//! — there is no recovering from those, so they are not part of this enum.

use thiserror::Error;

/// A recoverable file system error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A path element does not name an existing directory entry.
    #[error("no such file or directory")]
    NotFound,

    /// A path component that should be a directory is not one (or vice
    /// versa).
    #[error("not a directory")]
    NotADirectory,

    /// Expected a regular file, found a directory.
    #[error("is a directory")]
    IsADirectory,

    /// `open` was asked to open a directory for writing.
    #[error("directory not writable")]
    DirectoryNotWritable,

    /// `unlink` targeted a non-empty directory.
    #[error("directory not empty")]
    DirectoryNotEmpty,

    /// `link` targeted an inode living on a different device.
    #[error("cross-device link")]
    CrossDevice,

    /// `link`/`create` targeted a name that already exists.
    #[error("file exists")]
    AlreadyExists,

    /// A file descriptor does not refer to an open file.
    #[error("bad file descriptor")]
    BadFileDescriptor,

    /// A process's open-file table has no free slot left for a new
    /// descriptor.
    #[error("no free file descriptor table entry")]
    NoFreeFileDescriptorTableEntry,

    /// The operation requires a capability the open file does not have
    /// (e.g. writing through a read-only descriptor).
    #[error("permission denied")]
    PermissionDenied,

    /// A tag key was empty or longer than the key field can hold.
    #[error("tag key out of bounds")]
    TagKeyOutOfBounds,

    /// A tag value was longer than the value field can hold.
    #[error("tag value too large")]
    TagValueTooLarge,

    /// A file's tag block has no free record slots left.
    #[error("tag block full")]
    TagBlockFull,

    /// A tag lookup found no record for the requested key.
    #[error("no such tag")]
    TagNotFound,

    /// A caller-supplied argument was malformed (e.g. a name longer than
    /// `DIR_SIZE`, or a buffer too small for the result being copied into
    /// it).
    #[error("invalid argument")]
    InvalidArgument,

    /// The underlying block device reported an I/O failure.
    #[error("device I/O error")]
    Io,
}

pub type Result<T> = std::result::Result<T, Error>;
