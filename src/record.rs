//! The backup record: which source files have already been copied.
//!
//! The record lives in `<dest>/.photosync/record.tsv`, one tab separated line
//! per copied file:
//!
//! ```text
//! # photosync record v1
//! 100APPLE/IMG_0001.JPG	2023-07/IMG_0001.JPG	2023-07-15T12:00:00+02:00	2024-01-02T09:30:00+01:00
//! ```
//!
//! Lines are only ever appended, one per successful copy, so an interrupted
//! run leaves a record that is valid up to the last copied file.

use crate::error::SyncError;
use crate::Result;
use chrono::{DateTime, FixedOffset, Local};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Directory under the destination root holding photosync's own files
pub const STATE_DIR: &str = ".photosync";
pub const RECORD_FILE: &str = "record.tsv";
const HEADER: &str = "# photosync record v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub identifier: String,
    /// Destination relative to the destination root
    pub destination: String,
    pub modified: Option<DateTime<FixedOffset>>,
    pub copied_at: Option<DateTime<FixedOffset>>,
}

impl RecordEntry {
    pub fn new(identifier: &str, destination: &Path, modified: SystemTime) -> Self {
        Self {
            identifier: identifier.to_string(),
            destination: destination
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            modified: Some(DateTime::<Local>::from(modified).fixed_offset()),
            copied_at: Some(Local::now().fixed_offset()),
        }
    }

    fn to_line(&self) -> String {
        let stamp = |t: &Option<DateTime<FixedOffset>>| {
            t.map(|t| t.to_rfc3339()).unwrap_or_default()
        };
        format!(
            "{}\t{}\t{}\t{}",
            escape(&self.identifier),
            escape(&self.destination),
            stamp(&self.modified),
            stamp(&self.copied_at)
        )
    }

    fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let identifier = unescape(fields.next()?);
        if identifier.is_empty() {
            return None;
        }
        let destination = fields.next().map(unescape).unwrap_or_default();
        let stamp = |field: Option<&str>| {
            field
                .filter(|f| !f.is_empty())
                .and_then(|f| match DateTime::parse_from_rfc3339(f) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        log::warn!("Ignoring bad timestamp '{f}' for {identifier}: {e}");
                        None
                    }
                })
        };
        let modified = stamp(fields.next());
        let copied_at = stamp(fields.next());

        Some(Self {
            identifier,
            destination,
            modified,
            copied_at,
        })
    }
}

/// Set of identifiers already backed up into one destination
#[derive(Debug)]
pub struct BackupRecord {
    path: PathBuf,
    entries: HashMap<String, RecordEntry>,
}

impl BackupRecord {
    /// Path of the record file for a destination root
    pub fn record_path(dest_root: &Path) -> PathBuf {
        dest_root.join(STATE_DIR).join(RECORD_FILE)
    }

    /// Load the record of `dest_root`. A missing record file is a first run
    /// and yields an empty record.
    pub fn load(dest_root: &Path) -> Result<Self> {
        let path = Self::record_path(dest_root);
        let mut record = Self {
            path,
            entries: HashMap::new(),
        };

        // Lossy, so a torn multi-byte character cannot make the record unreadable
        let content = match fs::read(&record.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No record at {}, starting fresh", record.path.display());
                return Ok(record);
            }
            Err(cause) => {
                return Err(SyncError::RecordRead {
                    path: record.path,
                    cause,
                })
            }
        };

        // A last line without its newline is an append cut short by a crash
        let complete = if content.is_empty() || content.ends_with('\n') {
            content.len()
        } else {
            log::warn!("Ignoring incomplete last line in {}", record.path.display());
            content.rfind('\n').map(|end| end + 1).unwrap_or(0)
        };

        for (index, line) in content[..complete].lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match RecordEntry::parse_line(line) {
                Some(entry) => {
                    record.entries.insert(entry.identifier.clone(), entry);
                }
                None => log::warn!(
                    "Skipping malformed line {} in {}",
                    index + 1,
                    record.path.display()
                ),
            }
        }

        log::debug!(
            "Loaded {} entries from {}",
            record.entries.len(),
            record.path.display()
        );
        Ok(record)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&RecordEntry> {
        self.entries.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist `entry` and then add it to the in-memory set.
    ///
    /// The line is flushed to disk before this returns; on error the
    /// in-memory set is left unchanged.
    pub fn insert(&mut self, entry: RecordEntry) -> Result<()> {
        self.append_line(&entry)
            .map_err(|cause| SyncError::RecordWrite {
                path: self.path.clone(),
                cause,
            })?;
        self.entries.insert(entry.identifier.clone(), entry);
        Ok(())
    }

    fn append_line(&self, entry: &RecordEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut buf = String::new();
        let len = file.metadata()?.len();
        if len == 0 {
            buf.push_str(HEADER);
            buf.push('\n');
        } else {
            // Terminate a line left torn by an earlier crash
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                buf.push('\n');
            }
        }
        buf.push_str(&entry.to_line());
        buf.push('\n');

        file.write_all(buf.as_bytes())?;
        file.sync_data()
    }
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
