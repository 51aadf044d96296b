//! Source scanning.
//!
//! [`scan`] validates the source root up front and then hands out a lazy
//! iterator over the regular files below it. Nothing is read until the
//! iterator is driven, and calling [`scan`] again simply walks the tree anew.

use crate::error::SyncError;
use crate::utils::{is_hidden, validate_source};
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

/// A file discovered on the source device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the source root, `/`-separated (e.g. `100APPLE/IMG_0001.JPG`)
    pub identifier: String,
    pub file_name: String,
    pub modified: SystemTime,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub include_hidden: bool,
    pub follow_symlinks: bool,
    /// Lowercase extensions without the leading dot
    pub skip_extensions: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_hidden: false,
            follow_symlinks: false,
            skip_extensions: vec!["aae".to_string()],
        }
    }
}

impl ScanOptions {
    fn is_skipped_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.skip_extensions.iter().any(|skip| *skip == ext)
            })
            .unwrap_or(false)
    }
}

/// Lazy sequence of source files, see [`scan`]
pub struct SourceScan {
    root: PathBuf,
    options: ScanOptions,
    walker: Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>,
}

/// Start scanning `root`.
///
/// Fails with [`SyncError::SourceAccess`] if the root is missing or cannot be
/// listed (typically an unmounted device), or [`SyncError::SourceNotDirectory`].
pub fn scan(root: &Path, options: &ScanOptions) -> Result<SourceScan> {
    validate_source(root)?;

    let include_hidden = options.include_hidden;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        // The root itself is exempt: a mount point may well be a dot directory
        .filter_entry(move |entry| {
            entry.depth() == 0 || include_hidden || !is_hidden(entry.path())
        });

    Ok(SourceScan {
        root: root.to_path_buf(),
        options: options.clone(),
        walker: Box::new(walker),
    })
}

impl SourceScan {
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_file(&self, entry: &DirEntry) -> Result<SourceFile> {
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| SyncError::Scan {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let modified = metadata.modified().map_err(|e| SyncError::Scan {
            path: path.to_path_buf(),
            message: format!("no modification time: {e}"),
        })?;

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        Ok(SourceFile {
            path: path.to_path_buf(),
            identifier: identifier_for(relative),
            file_name: entry.file_name().to_string_lossy().into_owned(),
            modified,
            size: metadata.len(),
        })
    }
}

impl Iterator for SourceScan {
    type Item = Result<SourceFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    return Some(Err(SyncError::Scan {
                        path,
                        message: e.to_string(),
                    }));
                }
            };

            if !entry.file_type().is_file() {
                // Directories, plus symlinks when they are not followed
                continue;
            }
            if self.options.is_skipped_extension(entry.path()) {
                log::debug!("Skipping sidecar file {}", entry.path().display());
                continue;
            }

            return Some(self.source_file(&entry));
        }
    }
}

/// Join the components of a relative path with `/`. Components that are not
/// valid UTF-8 are converted lossily.
fn identifier_for(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
