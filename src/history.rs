use crate::record::STATE_DIR;
use crate::sync::{SyncOutcome, SyncReport};
use crate::Result;
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const HISTORY_FILE: &str = "runs.tsv";
const HEADER: &str =
    "# start\tend\telapsed_secs\tsource\toutcome\tcopied\tskipped\tfailed\tbytes_copied\tdest_size";

/// One finished sync run, as appended to the history file
#[derive(Debug, Clone)]
pub struct RunEntry {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub source: PathBuf,
    pub outcome: SyncOutcome,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_copied: u64,
    pub dest_size: u64,
}

impl RunEntry {
    pub fn from_report(report: &SyncReport, source: &Path, start: DateTime<Local>) -> Self {
        let end = start
            + chrono::Duration::from_std(report.elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            start,
            end,
            source: source.to_path_buf(),
            outcome: report.outcome,
            copied: report.copied,
            skipped: report.skipped,
            failed: report.failures.len(),
            bytes_copied: report.bytes_copied,
            dest_size: report.dest_size,
        }
    }

    fn to_line(&self) -> String {
        let elapsed = (self.end - self.start).num_seconds().max(0);
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            elapsed,
            self.source.display().to_string().replace(['\t', '\n'], " "),
            self.outcome,
            self.copied,
            self.skipped,
            self.failed,
            self.bytes_copied,
            self.dest_size
        )
    }
}

pub fn history_path(dest_root: &Path) -> PathBuf {
    dest_root.join(STATE_DIR).join(HISTORY_FILE)
}

/// Append `entry` to the history file of `dest_root`
pub fn append_run(dest_root: &Path, entry: &RunEntry) -> Result<()> {
    let path = history_path(dest_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "{HEADER}")?;
    }
    writeln!(file, "{}", entry.to_line())?;
    Ok(())
}
