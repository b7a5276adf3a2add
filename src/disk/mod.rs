//! Persistent storage for the console log
//!
//! This module provides the storage seam and the rotating file sink:
//!
//! - `Storage`, the byte-oriented operations the sink needs from a mounted
//!   filesystem (exists, size, append, rename, remove)
//! - `FsStorage`, an implementation over `std::fs` rooted at a mount point
//! - `RotationSink`, which appends lines and rolls generations over
//!
//! Mounting is the host's job; the sink only ever sees paths relative to
//! the storage root.

pub mod rotation;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Byte-oriented operations over a mounted filesystem
pub trait Storage: Send {
    /// Whether `path` exists
    fn exists(&self, path: &str) -> bool;

    /// Size of `path` in bytes
    fn size(&self, path: &str) -> io::Result<u64>;

    /// Append `data` to `path`, creating it if missing
    fn append(&mut self, path: &str, data: &[u8]) -> io::Result<()>;

    /// Rename `from` to `to`
    fn rename(&mut self, from: &str, to: &str) -> io::Result<()>;

    /// Remove `path`
    fn remove(&mut self, path: &str) -> io::Result<()>;
}

/// [`Storage`] over the host filesystem, rooted at a mount point
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create a storage rooted at `root`
    ///
    /// Leading `/` in sink paths is treated as relative to this root.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Mount point of this storage
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a sink path against the root
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Storage for FsStorage {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn size(&self, path: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.resolve(path))?.len())
    }

    fn append(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path))?;
        file.write_all(data)
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.resolve(from), self.resolve(to))
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path))
    }
}
