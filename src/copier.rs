use crate::error::SyncError;
use crate::planner::CopyTask;
use crate::signal::{SyncContext, TEMP_PREFIX};
use crate::Result;
use filetime::FileTime;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    pub preserve_timestamps: bool,
    pub preserve_permissions: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            preserve_timestamps: true,
            preserve_permissions: false,
        }
    }
}

/// Copies planned files into a destination root
pub struct Copier {
    dest_root: PathBuf,
    options: CopyOptions,
    context: SyncContext,
}

impl Copier {
    pub fn new(dest_root: &Path, options: CopyOptions, context: SyncContext) -> Self {
        Self {
            dest_root: dest_root.to_path_buf(),
            options,
            context,
        }
    }

    /// Absolute path a task will be written to
    pub fn target_path(&self, task: &CopyTask) -> PathBuf {
        self.dest_root.join(&task.destination)
    }

    /// Copy one file and return the number of bytes written.
    ///
    /// The bytes go to a temp file next to the target which is renamed over
    /// the target once complete, so the target is either the old file or the
    /// full new one. An existing target is overwritten.
    pub fn copy(&self, task: &CopyTask) -> Result<u64> {
        let source = &task.source.path;
        let target = self.target_path(task);
        let target_dir = target.parent().unwrap_or(self.dest_root.as_path());

        fs::create_dir_all(target_dir).map_err(|e| classify(e, source, &target))?;

        if target.exists() {
            log::debug!("Overwriting existing {}", target.display());
        }

        let temp = self
            .context
            .register(target_dir.join(temp_name(&task.source.file_name)));

        let bytes = fs::copy(source, temp.path()).map_err(|e| classify(e, source, &target))?;
        self.preserve_metadata(source, temp.path())
            .map_err(|e| classify(e, source, &target))?;
        fs::rename(temp.path(), &target).map_err(|e| classify(e, source, &target))?;
        temp.disarm();

        Ok(bytes)
    }

    fn preserve_metadata(&self, source: &Path, dest: &Path) -> std::io::Result<()> {
        let metadata = fs::metadata(source)?;

        if self.options.preserve_permissions {
            fs::set_permissions(dest, metadata.permissions())?;
        }

        if self.options.preserve_timestamps {
            let modified = FileTime::from_last_modification_time(&metadata);
            let accessed = FileTime::from_last_access_time(&metadata);
            filetime::set_file_times(dest, accessed, modified)?;
        }

        Ok(())
    }
}

fn temp_name(file_name: &str) -> String {
    format!("{TEMP_PREFIX}{}_{file_name}", std::process::id())
}

/// Map an IO error during a copy onto the matching per-file error
fn classify(error: std::io::Error, from: &Path, to: &Path) -> SyncError {
    if error.kind() == ErrorKind::PermissionDenied {
        return SyncError::PermissionDenied {
            path: to.to_path_buf(),
        };
    }
    if is_out_of_space(&error) {
        return SyncError::InsufficientSpace {
            path: to.to_path_buf(),
        };
    }
    SyncError::FileCopy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        cause: error,
    }
}

fn is_out_of_space(error: &std::io::Error) -> bool {
    // ENOSPC on unix, ERROR_DISK_FULL / ERROR_HANDLE_DISK_FULL on windows
    #[cfg(unix)]
    const CODES: &[i32] = &[28];
    #[cfg(windows)]
    const CODES: &[i32] = &[39, 112];
    #[cfg(not(any(unix, windows)))]
    const CODES: &[i32] = &[];

    error
        .raw_os_error()
        .map(|code| CODES.contains(&code))
        .unwrap_or(false)
}
