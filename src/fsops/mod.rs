//! Filesystem collaborator interface.
//!
//! The orchestrator never touches `std::fs` directly; everything goes
//! through this trait so tests can observe and fault-inject filesystem
//! behavior. Operations are short metadata calls and a rename, so the
//! trait stays synchronous.

use std::fs;
use std::io;
use std::path::Path;

/// Minimal filesystem surface the organizer needs.
pub trait FileOps: Send + Sync {
    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Atomically move a file into place. Source and destination are on
    /// the same filesystem by construction (staging lives under the music
    /// root), so a rename never degrades into copy+delete.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Size of a file in bytes, or None if it does not exist.
    fn file_size(&self, path: &Path) -> io::Result<Option<u64>>;

    /// True when the path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Write a whole file (cover art).
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Remove a file, ignoring a missing one.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// The real filesystem.
pub struct DiskFileOps;

impl FileOps for DiskFileOps {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
