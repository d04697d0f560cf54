// File system seam used for cache invalidation.
//
// The cache only needs modification times and sizes, so the abstraction stays
// that small. Tests substitute their own implementation.

use camino::Utf8Path;
use std::io;
use std::time::SystemTime;

/// Modification time and size of a file at the moment it was inspected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

/// Read-only view of file metadata
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    /// Current stamp of `path`, or an error if it cannot be inspected
    fn stamp(&self, path: &Utf8Path) -> io::Result<FileStamp>;
}

/// [`FileSystem`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn stamp(&self, path: &Utf8Path) -> io::Result<FileStamp> {
        let metadata = std::fs::metadata(path)?;
        Ok(FileStamp {
            modified: metadata.modified()?,
            len: metadata.len(),
        })
    }
}
