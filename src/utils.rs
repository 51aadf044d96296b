use crate::error::SyncError;
use crate::Result;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Validate that the source root exists, is a directory and can be listed.
pub fn validate_source(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|cause| SyncError::SourceAccess {
        path: path.to_path_buf(),
        cause,
    })?;

    if !metadata.is_dir() {
        return Err(SyncError::SourceNotDirectory {
            path: path.to_path_buf(),
        });
    }

    // An unmounted fuse mount point stats fine but fails on read_dir
    fs::read_dir(path).map_err(|cause| SyncError::SourceAccess {
        path: path.to_path_buf(),
        cause,
    })?;

    Ok(())
}

/// Validate that the destination root exists and is a directory
pub fn validate_destination(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(SyncError::DestinationNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Total size in bytes of all regular files below `dir`. Unreadable entries are ignored.
pub fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Format byte size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes < THRESHOLD {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    format!("{size:.1} {unit}")
}

/// Format a duration as `"<m> min <s> sec"`
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    let total = elapsed.as_secs();
    format!("{} min {} sec", total / 60, total % 60)
}

/// Check if a path is hidden (starts with .)
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
