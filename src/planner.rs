use crate::record::BackupRecord;
use crate::scanner::SourceFile;
use crate::Result;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::SystemTime;

/// A file that needs to be copied, with its destination relative to the destination root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub source: SourceFile,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Copy(CopyTask),
    AlreadyBackedUp(SourceFile),
}

/// `YYYY-MM` folder name for a modification time, in the local time zone
pub fn month_folder(modified: SystemTime) -> String {
    DateTime::<Local>::from(modified).format("%Y-%m").to_string()
}

/// Whether `name` has the shape produced by [`month_folder`]
pub fn is_month_folder(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

/// Destination of `file` relative to the destination root: `YYYY-MM/<file name>`.
///
/// Two source files with the same name and month map to the same path; the
/// one copied last wins. File names that are not valid UTF-8 are converted
/// lossily, so two such names differing only in their invalid bytes also
/// share a destination.
pub fn destination_path(file: &SourceFile) -> PathBuf {
    PathBuf::from(month_folder(file.modified)).join(&file.file_name)
}

/// Decide what to do with one scanned file
pub fn decide(file: SourceFile, record: &BackupRecord) -> Decision {
    if record.contains(&file.identifier) {
        return Decision::AlreadyBackedUp(file);
    }
    let destination = destination_path(&file);
    Decision::Copy(CopyTask {
        source: file,
        destination,
    })
}

/// Decisions for a whole scan, as used by dry runs and progress totals
#[derive(Debug, Default)]
pub struct Plan {
    pub tasks: Vec<CopyTask>,
    pub already_backed_up: usize,
}

impl Plan {
    pub fn total_bytes(&self) -> u64 {
        self.tasks.iter().map(|task| task.source.size).sum()
    }
}

/// Plan every file of `files`; the first scan error aborts planning
pub fn plan<I>(files: I, record: &BackupRecord) -> Result<Plan>
where
    I: IntoIterator<Item = Result<SourceFile>>,
{
    let mut plan = Plan::default();
    for file in files {
        match decide(file?, record) {
            Decision::Copy(task) => plan.tasks.push(task),
            Decision::AlreadyBackedUp(_) => plan.already_backed_up += 1,
        }
    }
    Ok(plan)
}
