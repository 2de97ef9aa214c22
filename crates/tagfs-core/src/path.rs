//! Path resolution: `skip_elem`/`namei`/`nameiparent`.
//!
//! Grounded on `kernel::fs::path` in the teacher. Paths are plain `&[u8]`
//! slices rather than `ov6_types::Path` (that type and its `OsStr` sibling
//! are not carried into this port — see `DESIGN.md`), which sidesteps the
//! NUL-termination hazard the source's `skipelem` had: there is no
//! null-terminated C string to overrun in the first place.

use tagfs_types::{DIR_SIZE, FS_BLOCK_SIZE, InodeNo, T_DIR};

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::inode::Inode;

/// Splits the next path element off the front of `path`.
///
/// Returns `(element, rest)` where `element` is the bytes up to (not
/// including) the next `/`, and `rest` has any further leading `/`
/// characters stripped. Returns `None` once `path` is empty after stripping
/// leading slashes.
///
/// ```ignore
/// assert_eq!(skip_elem(b"a/bb/c"), Some((&b"a"[..], &b"bb/c"[..])));
/// assert_eq!(skip_elem(b"///a/bb"), Some((&b"a"[..], &b"bb"[..])));
/// assert_eq!(skip_elem(b"a"), Some((&b"a"[..], &b""[..])));
/// assert_eq!(skip_elem(b""), None);
/// ```
#[must_use]
pub fn skip_elem(path: &[u8]) -> Option<(&[u8], &[u8])> {
    let path = skip_slashes(path);
    if path.is_empty() {
        return None;
    }
    let end = path.iter().position(|&b| b == b'/').unwrap_or(path.len());
    let (elem, rest) = path.split_at(end);
    Some((elem, skip_slashes(rest)))
}

fn skip_slashes(path: &[u8]) -> &[u8] {
    let start = path.iter().position(|&b| b != b'/').unwrap_or(path.len());
    &path[start..]
}

impl<D> FileSystem<D>
where
    D: BlockDevice<FS_BLOCK_SIZE>,
{
    /// Resolves `path` to an inode, starting from `cwd` unless `path` is
    /// absolute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if any path element is missing, or
    /// [`Error::NotADirectory`] if a non-final element is not a directory.
    pub fn resolve(&self, path: &[u8], cwd: InodeNo) -> Result<Inode<'_, D>> {
        self.resolve_impl(path, cwd, false).map(|(ip, _)| ip)
    }

    /// Resolves all but the last element of `path`, returning the parent
    /// directory's inode and the final element's name.
    ///
    /// # Errors
    ///
    /// Same as [`Self::resolve`]. Additionally returns
    /// [`Error::InvalidArgument`] if the final element is empty or longer
    /// than [`DIR_SIZE`].
    pub fn resolve_parent<'p>(
        &self,
        path: &'p [u8],
        cwd: InodeNo,
    ) -> Result<(Inode<'_, D>, &'p [u8])> {
        let (ip, name) = self.resolve_impl(path, cwd, true)?;
        let name = name.ok_or(Error::InvalidArgument)?;
        if name.is_empty() || name.len() > DIR_SIZE {
            return Err(Error::InvalidArgument);
        }
        Ok((ip, name))
    }

    fn resolve_impl<'p>(
        &self,
        path: &'p [u8],
        cwd: InodeNo,
        stop_before_last: bool,
    ) -> Result<(Inode<'_, D>, Option<&'p [u8]>)> {
        let mut ip = if path.first() == Some(&b'/') {
            Inode::get(self, self.root_ino())
        } else {
            Inode::get(self, cwd)
        };

        let mut rest = path;
        loop {
            let Some((elem, tail)) = skip_elem(rest) else {
                // No element left to consume. For `resolve_parent`, that
                // means the path named no final component at all (e.g. "/"
                // or ""), which is an error; for `resolve` it means `ip` is
                // the answer.
                if stop_before_last {
                    return Err(Error::InvalidArgument);
                }
                return Ok((ip, None));
            };

            let locked = ip.lock();
            if locked.ty() != T_DIR {
                return Err(Error::NotADirectory);
            }

            if stop_before_last && skip_elem(tail).is_none() {
                drop(locked);
                return Ok((ip, Some(elem)));
            }

            let Some((next, _off)) = locked.lookup(elem) else {
                return Err(Error::NotFound);
            };
            drop(locked);
            ip = next;
            rest = tail;
        }
    }
}
