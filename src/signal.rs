use crate::error::SyncError;
use crate::planner::is_month_folder;
use crate::record::STATE_DIR;
use crate::Result;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const LOCK_FILE: &str = "photosync.lock";
/// Prefix of in-flight copies inside a month folder
pub const TEMP_PREFIX: &str = ".photosync_tmp_";

/// Interrupt state and in-flight paths for one sync session
#[derive(Clone)]
pub struct SyncContext {
    interrupt_flag: Arc<AtomicBool>,
    active_paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl SyncContext {
    pub fn new() -> Self {
        Self {
            interrupt_flag: Arc::new(AtomicBool::new(false)),
            active_paths: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Check if an interrupt has been requested
    pub fn is_interrupted(&self) -> bool {
        self.interrupt_flag.load(Ordering::SeqCst)
    }

    /// Set interrupt state; returns the previous state
    pub fn set_interrupted(&self, interrupted: bool) -> bool {
        self.interrupt_flag.swap(interrupted, Ordering::SeqCst)
    }

    /// Track `path` so it is removed if the process has to exit mid-operation
    pub fn register(&self, path: PathBuf) -> PathGuard {
        if let Ok(mut paths) = self.active_paths.lock() {
            paths.insert(path.clone());
        }
        PathGuard {
            path,
            context: self.clone(),
            armed: true,
        }
    }

    /// Get a snapshot of currently tracked paths
    pub fn active_paths(&self) -> Vec<PathBuf> {
        self.active_paths
            .lock()
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every tracked path from disk. Called from the signal handler
    /// right before a forced exit.
    pub fn cleanup_active_paths(&self) {
        for path in self.active_paths() {
            if path.exists() && fs::remove_file(&path).is_err() {
                eprintln!("Warning: could not remove {}", path.display());
            }
        }
        if let Ok(mut paths) = self.active_paths.lock() {
            paths.clear();
        }
    }

    fn forget(&self, path: &Path) {
        if let Ok(mut paths) = self.active_paths.lock() {
            paths.remove(path);
        }
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a tracked path. Dropping an armed guard deletes the file;
/// [`PathGuard::disarm`] keeps it.
pub struct PathGuard {
    path: PathBuf,
    context: SyncContext,
    armed: bool,
}

impl PathGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file reached its final state (or was renamed away); stop tracking it
    pub fn disarm(mut self) {
        self.armed = false;
        self.context.forget(&self.path);
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
            self.context.forget(&self.path);
        }
    }
}

/// Exclusive lock on a destination directory, held for the duration of a run
pub struct SyncLock {
    _guard: PathGuard,
}

impl SyncLock {
    pub fn lock_path(dest_root: &Path) -> PathBuf {
        dest_root.join(STATE_DIR).join(LOCK_FILE)
    }

    /// Create the lock file. Fails with [`SyncError::AlreadyRunning`] if it exists.
    pub fn acquire(dest_root: &Path, context: &SyncContext) -> Result<Self> {
        let path = Self::lock_path(dest_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SyncError::AlreadyRunning { path })
            }
            Err(e) => return Err(SyncError::Io(e)),
        };
        let guard = context.register(path);
        writeln!(file, "{}", std::process::id())?;

        log::debug!("Acquired lock {}", guard.path().display());
        Ok(Self { _guard: guard })
    }
}

/// Remove temp files left behind by a killed run, at the top level of
/// `dest_root` and inside its `YYYY-MM` folders. Directories that cannot be
/// listed are logged and skipped; returns the number of files removed.
pub fn cleanup_temp_files(dest_root: &Path) -> usize {
    if !dest_root.is_dir() {
        return 0;
    }

    let mut removed = 0;
    for dir in std::iter::once(dest_root.to_path_buf()).chain(month_folders(dest_root)) {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Not sweeping {} for temp files: {e}", dir.display());
                continue;
            }
        };
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    log::debug!("Skipping unreadable entry in {}: {e}", dir.display());
                    continue;
                }
            };
            let is_temp = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(TEMP_PREFIX))
                .unwrap_or(false);
            if is_temp && path.is_file() && fs::remove_file(&path).is_ok() {
                log::info!("Removed stale temp file {}", path.display());
                removed += 1;
            }
        }
    }
    removed
}

/// Subdirectories of `dir` named like a month folder
fn month_folders(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot list {}: {e}", dir.display());
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_str().map(is_month_folder).unwrap_or(false))
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_guard_removes_file_unless_disarmed() {
        let dir = tempdir().unwrap();
        let context = SyncContext::new();

        let kept = dir.path().join("kept");
        fs::write(&kept, "x").unwrap();
        let guard = context.register(kept.clone());
        assert!(context.active_paths().contains(&kept));
        guard.disarm();
        assert!(kept.exists());
        assert!(context.active_paths().is_empty());

        let dropped = dir.path().join("dropped");
        fs::write(&dropped, "x").unwrap();
        {
            let _guard = context.register(dropped.clone());
        }
        assert!(!dropped.exists());
        assert!(context.active_paths().is_empty());
    }

    #[test]
    fn test_cleanup_active_paths() {
        let dir = tempdir().unwrap();
        let context = SyncContext::new();
        let a = dir.path().join("a");
        let missing = dir.path().join("missing");
        fs::write(&a, "x").unwrap();

        let guard_a = context.register(a.clone());
        let guard_missing = context.register(missing);
        context.cleanup_active_paths();

        assert!(!a.exists());
        assert!(context.active_paths().is_empty());
        guard_a.disarm();
        guard_missing.disarm();
    }

    #[test]
    fn test_interrupt_flag() {
        let context = SyncContext::new();
        assert!(!context.is_interrupted());
        assert!(!context.set_interrupted(true));
        assert!(context.clone().is_interrupted());
        assert!(context.set_interrupted(true));
    }

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempdir().unwrap();
        let context = SyncContext::new();
        let lock_path = SyncLock::lock_path(dir.path());

        let lock = SyncLock::acquire(dir.path(), &context).unwrap();
        assert!(lock_path.exists());

        match SyncLock::acquire(dir.path(), &context) {
            Err(SyncError::AlreadyRunning { path }) => assert_eq!(path, lock_path),
            Err(other) => panic!("Expected AlreadyRunning, got {other:?}"),
            Ok(_) => panic!("Expected AlreadyRunning, got a second lock"),
        }

        drop(lock);
        assert!(!lock_path.exists());
        assert!(SyncLock::acquire(dir.path(), &context).is_ok());
    }

    #[test]
    fn test_cleanup_temp_files() {
        let dir = tempdir().unwrap();
        let month = dir.path().join("2023-07");
        fs::create_dir_all(&month).unwrap();

        let stale_top = dir.path().join(".photosync_tmp_42_a.jpg");
        let stale_month = month.join(".photosync_tmp_42_IMG_0001.JPG");
        let photo = month.join("IMG_0002.JPG");
        fs::write(&stale_top, "x").unwrap();
        fs::write(&stale_month, "x").unwrap();
        fs::write(&photo, "x").unwrap();

        assert_eq!(cleanup_temp_files(dir.path()), 2);
        assert!(!stale_top.exists());
        assert!(!stale_month.exists());
        assert!(photo.exists());
    }

    #[test]
    fn test_cleanup_temp_files_missing_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(cleanup_temp_files(&dir.path().join("nope")), 0);
    }

    #[test]
    fn test_cleanup_temp_files_only_looks_in_month_folders() {
        let dir = tempdir().unwrap();
        let other = dir.path().join("Screenshots");
        fs::create_dir_all(&other).unwrap();
        let foreign = other.join(".photosync_tmp_42_a.jpg");
        fs::write(&foreign, "x").unwrap();

        assert_eq!(cleanup_temp_files(dir.path()), 0);
        assert!(foreign.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_temp_files_skips_unreadable_directories() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let lost_found = dir.path().join("lost+found");
        let locked_month = dir.path().join("2023-06");
        let month = dir.path().join("2023-07");
        for d in [&lost_found, &locked_month, &month] {
            fs::create_dir_all(d).unwrap();
        }
        let stale = month.join(".photosync_tmp_42_IMG_0001.JPG");
        fs::write(&stale, "x").unwrap();
        fs::set_permissions(&lost_found, fs::Permissions::from_mode(0o000)).unwrap();
        fs::set_permissions(&locked_month, fs::Permissions::from_mode(0o000)).unwrap();

        let removed = cleanup_temp_files(dir.path());

        fs::set_permissions(&lost_found, fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(&locked_month, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());
    }
}
