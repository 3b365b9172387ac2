//! Low-level fsync operations for durability.
//!
//! Both file and directory fsyncs are required for crash safety: on POSIX
//! systems, creating or renaming a file updates the directory entry, and that
//! entry may not survive a power loss unless the directory itself is synced.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory to disk, ensuring directory entries are durable.
///
/// Without this, a newly created file might be lost, a renamed file might
/// revert to its old name, and a deleted file might reappear.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
