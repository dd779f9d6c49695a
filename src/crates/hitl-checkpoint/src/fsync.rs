//! Crash-safe file writes
//!
//! Every durable write in this crate goes through [`atomic_write`]: write a
//! uniquely named temp file in the target directory, fsync it, rename it over
//! the target, then fsync the directory so the rename itself survives a power
//! loss. Readers therefore see either the old document or the new one.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Syncs a directory so that renames inside it are durable.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Atomically replaces `path` with `data`.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    // Unique temp name so concurrent writers never share a temp file
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("record"),
        uuid::Uuid::new_v4()
    );
    let temp_path = parent.join(temp_name);

    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    #[cfg(unix)]
    fsync_dir(parent)?;

    Ok(())
}
