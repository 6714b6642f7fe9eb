//! Atomic file writes for trinity state.
//!
//! The backlog snapshot must never be observable in a half-written state:
//! a crash mid-persist would otherwise corrupt the store and make the run
//! unresumable. All writes go through temp file + fsync + rename.
//!
//! On POSIX, `rename()` atomically replaces the destination when source and
//! destination are on the same filesystem. The temp file is created next to
//! the target so the rename never crosses a filesystem boundary. On crash, a
//! stray `.{filename}.tmp` may remain; it is overwritten by the next write.

use crate::error::{Result, TrinityError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file.
///
/// Writes to a temporary file in the target's directory, syncs it to disk,
/// then renames it over the target.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            TrinityError::IoFailure(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = temp_path_for(path)?;
    write_and_sync(&temp_path, content)?;
    replace(&temp_path, path)?;

    Ok(())
}

/// Atomically write a string to a file.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Temp file path in the same directory as the target.
fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TrinityError::IoFailure(format!("invalid file path '{}'", target.display())))?;
    Ok(parent.join(format!(".{}.tmp", filename)))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        TrinityError::IoFailure(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        TrinityError::IoFailure(format!("failed to write temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        TrinityError::IoFailure(format!("failed to sync temporary file to disk: {}", e))
    })?;

    Ok(())
}

#[cfg(unix)]
fn replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        TrinityError::IoFailure(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })?;

    // Sync the directory entry as well so the rename itself is durable.
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(windows)]
fn replace(source: &Path, target: &Path) -> Result<()> {
    // Windows rename fails when the target exists; remove first. This is a
    // small non-atomic window, acceptable for the platforms trinity targets.
    if target.exists() {
        fs::remove_file(target).map_err(|e| {
            let _ = fs::remove_file(source);
            TrinityError::IoFailure(format!(
                "failed to remove '{}' before replace: {}",
                target.display(),
                e
            ))
        })?;
    }

    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        TrinityError::IoFailure(format!(
            "failed to replace '{}': {}",
            target.display(),
            e
        ))
    })
}
