use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Source directory is not accessible: {path} ({cause})")]
    SourceAccess {
        path: PathBuf,
        cause: std::io::Error,
    },

    #[error("Source is not a directory: {path}")]
    SourceNotDirectory { path: PathBuf },

    #[error("Destination directory not found: {path}")]
    DestinationNotFound { path: PathBuf },

    #[error("Source disappeared during sync: {path}")]
    SourceDisconnected { path: PathBuf },

    #[error("Another sync is already running on {path}")]
    AlreadyRunning { path: PathBuf },

    #[error("Failed to read entry under {path}: {message}")]
    Scan { path: PathBuf, message: String },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("No space left on device while writing {path}")]
    InsufficientSpace { path: PathBuf },

    #[error("Failed to copy '{from}' to '{to}': {cause}")]
    FileCopy {
        from: PathBuf,
        to: PathBuf,
        cause: std::io::Error,
    },

    #[error("Failed to read backup record '{path}': {cause}")]
    RecordRead {
        path: PathBuf,
        cause: std::io::Error,
    },

    #[error("Failed to update backup record '{path}': {cause}")]
    RecordWrite {
        path: PathBuf,
        cause: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation interrupted by user")]
    Interrupted,

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl SyncError {
    /// Create a configuration error with a custom message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// True for errors that only affect a single file; the run continues past them.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            SyncError::Scan { .. }
                | SyncError::PermissionDenied { .. }
                | SyncError::InsufficientSpace { .. }
                | SyncError::FileCopy { .. }
                | SyncError::Io(_)
        )
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Interrupted => 130,
            SyncError::Validation { .. } => 2,
            SyncError::Config { .. } => 2,
            _ => 1,
        }
    }

    /// Provide helpful suggestions for resolving the error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            SyncError::SourceAccess { .. } | SyncError::SourceDisconnected { .. } => vec![
                "Check that the device is connected and unlocked".to_string(),
                "Mount the device again (e.g. `ifuse <mountpoint>`)".to_string(),
                "Make sure the mount point is readable by the current user".to_string(),
            ],
            SyncError::DestinationNotFound { .. } => vec![
                "Create the destination directory first".to_string(),
                "Check that the backup drive is mounted".to_string(),
            ],
            SyncError::AlreadyRunning { path } => vec![
                "Wait for the other sync to finish".to_string(),
                format!(
                    "If no other sync is running, remove the stale lock: {}",
                    path.display()
                ),
            ],
            SyncError::InsufficientSpace { .. } => vec![
                "Free up disk space on the destination".to_string(),
                "Choose a different backup location".to_string(),
            ],
            SyncError::PermissionDenied { .. } => vec![
                "Check file permissions".to_string(),
                "Ensure the destination directory is writable".to_string(),
            ],
            _ => vec![],
        }
    }
}
