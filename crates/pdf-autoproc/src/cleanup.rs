//! Housekeeping for scratch and output folders

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Remove every entry inside `dir`, returning how many were removed.
///
/// A missing folder counts as already clean.
pub fn remove_children(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// Remove folders in `dir` not modified for longer than `max_age`.
///
/// Failures are logged and skipped.
pub fn sweep_expired(dir: &Path, max_age: Duration, now: SystemTime) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > max_age);
        if !expired || !path.is_dir() {
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => {
                log::info!("Purged expired scratch folder {}", path.display());
                removed += 1;
            }
            Err(e) => log::warn!("Cannot purge {}: {}", path.display(), e),
        }
    }
    removed
}

/// Remove temporary files left in `dir` by interrupted atomic writes
pub fn remove_stale_temp_files(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        // Temp files from `NamedTempFile` are named `.tmp` plus random characters
        if !name.starts_with(".tmp") || !entry.path().is_file() {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                log::debug!("Removed interrupted write {}", name);
                removed += 1;
            }
            Err(e) => log::warn!("Cannot remove interrupted write {}: {}", name, e),
        }
    }
    removed
}
