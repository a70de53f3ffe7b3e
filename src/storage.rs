//! Atomic write helpers for durable files.
//!
//! Blob and config writes go through a temp file, fsync, and rename so a
//! crash mid-write never leaves a torn file behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Write data atomically to a file.
///
/// Creates a temporary sibling, writes the data, syncs, then renames over
/// the target and syncs the parent directory.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        let dir = OpenOptions::new().read(true).open(parent)?;
        dir.sync_all()?;
    }

    Ok(())
}
