use crate::config::Config;
use crate::copier::Copier;
use crate::error::SyncError;
use crate::history::{self, RunEntry};
use crate::planner::{self, Decision, Plan};
use crate::progress::SyncProgress;
use crate::record::{BackupRecord, RecordEntry};
use crate::scanner::{scan, ScanOptions, SourceFile, SourceScan};
use crate::signal::{cleanup_temp_files, SyncContext, SyncLock};
use crate::utils::{directory_size, format_elapsed, format_size, validate_destination, validate_source};
use crate::Result;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How a sync run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncOutcome {
    /// Every source file was visited
    #[default]
    Completed,
    /// Stopped early on Ctrl-C; the record is consistent up to the last copy
    Interrupted,
    /// The source root became unreachable mid-run
    Disconnected,
    /// A fatal error stopped the run after it had started copying
    Aborted,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncOutcome::Completed => "completed",
            SyncOutcome::Interrupted => "interrupted",
            SyncOutcome::Disconnected => "disconnected",
            SyncOutcome::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A file that could not be backed up during a run
#[derive(Debug)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub copied: usize,
    pub skipped: usize,
    pub bytes_copied: u64,
    pub failures: Vec<FailedFile>,
    pub outcome: SyncOutcome,
    pub elapsed: Duration,
    /// Size of the destination tree after the run
    pub dest_size: u64,
}

impl SyncReport {
    /// Summary lines printed at the end of a run
    pub fn summary(&self) -> Vec<String> {
        let status = match self.outcome {
            SyncOutcome::Completed => "Backup completed",
            SyncOutcome::Interrupted => "Backup stopped",
            SyncOutcome::Disconnected => "Backup stopped, source disconnected",
            SyncOutcome::Aborted => "Backup aborted",
        };
        let mut lines = vec![
            status.to_string(),
            format!(
                "new backups       : {} ({})",
                self.copied,
                format_size(self.bytes_copied)
            ),
            format!("already backed up : {}", self.skipped),
            format!("total space usage : {}", format_size(self.dest_size)),
            format!("elapsed time      : {}", format_elapsed(self.elapsed)),
        ];
        if !self.failures.is_empty() {
            lines.push(format!("failures          : {}", self.failures.len()));
        }
        lines
    }

    /// Process exit code for a run that returned a report
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            SyncOutcome::Interrupted => SyncError::Interrupted.exit_code(),
            SyncOutcome::Disconnected | SyncOutcome::Aborted => 1,
            SyncOutcome::Completed if !self.failures.is_empty() => 1,
            SyncOutcome::Completed => 0,
        }
    }
}

/// Copy every unrecorded file of `source` into its month folder under `dest`.
///
/// Fails before copying anything if either root is unusable, another run
/// holds the destination lock, or the record cannot be read. Per-file errors
/// are collected in the report and the run carries on, unless the source
/// root itself has gone away, in which case the run stops with
/// [`SyncOutcome::Disconnected`].
pub fn run_sync(
    source: &Path,
    dest: &Path,
    config: &Config,
    context: &SyncContext,
    progress: &mut SyncProgress,
) -> Result<SyncReport> {
    let session = SyncSession::open(source, dest, config, context)?;

    if progress.wants_total() {
        match planner::plan(session.scan()?, session.record()) {
            Ok(plan) => progress.start(plan.tasks.len(), plan.total_bytes()),
            Err(e) => log::debug!("Not sizing progress bar: {e}"),
        }
    }

    let files = session.scan()?;
    session.run(files, progress)
}

/// A destination opened for syncing: locked, swept of stale temp files and
/// with its record loaded. Dropping the session releases the lock.
pub struct SyncSession {
    source: PathBuf,
    dest: PathBuf,
    scan_options: ScanOptions,
    context: SyncContext,
    record: BackupRecord,
    copier: Copier,
    started: Instant,
    start_time: DateTime<Local>,
    _lock: SyncLock,
}

impl SyncSession {
    pub fn open(
        source: &Path,
        dest: &Path,
        config: &Config,
        context: &SyncContext,
    ) -> Result<Self> {
        let started = Instant::now();
        let start_time = Local::now();

        validate_destination(dest)?;
        validate_source(source)?;

        let lock = SyncLock::acquire(dest, context)?;
        let stale = cleanup_temp_files(dest);
        if stale > 0 {
            log::info!("Removed {stale} temp files left by an earlier run");
        }

        let record = BackupRecord::load(dest)?;
        log::debug!(
            "Loaded {} recorded files from {}",
            record.len(),
            record.path().display()
        );

        Ok(Self {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
            scan_options: config.scan_options(),
            context: context.clone(),
            record,
            copier: Copier::new(dest, config.copy_options(), context.clone()),
            started,
            start_time,
            _lock: lock,
        })
    }

    pub fn record(&self) -> &BackupRecord {
        &self.record
    }

    /// A fresh scan of the source root
    pub fn scan(&self) -> Result<SourceScan> {
        scan(&self.source, &self.scan_options)
    }

    /// Back up `files` and append the run to the history.
    ///
    /// A fatal error mid-run (such as the record becoming unwritable) is
    /// returned after the progress bar is cleared and the run is logged to
    /// the history as `aborted`.
    pub fn run<I>(mut self, files: I, progress: &mut SyncProgress) -> Result<SyncReport>
    where
        I: IntoIterator<Item = Result<SourceFile>>,
    {
        let mut report = SyncReport::default();
        let result = self.copy_all(files, progress, &mut report);
        if let Err(e) = &result {
            log::error!("Sync aborted after {} copies: {e}", report.copied);
            report.outcome = SyncOutcome::Aborted;
        }

        progress.finish();
        report.elapsed = self.started.elapsed();
        report.dest_size = directory_size(&self.dest);

        let entry = RunEntry::from_report(&report, &self.source, self.start_time);
        if let Err(e) = history::append_run(&self.dest, &entry) {
            log::warn!("Could not append to run history: {e}");
        }

        result.map(|()| report)
    }

    fn copy_all<I>(
        &mut self,
        files: I,
        progress: &mut SyncProgress,
        report: &mut SyncReport,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Result<SourceFile>>,
    {
        for file in files {
            if self.context.is_interrupted() {
                report.outcome = SyncOutcome::Interrupted;
                break;
            }

            let file = match file {
                Ok(file) => file,
                Err(error) => {
                    let path = match &error {
                        SyncError::Scan { path, .. } => path.clone(),
                        _ => self.source.clone(),
                    };
                    if !record_failure(report, &self.source, path, error, progress)? {
                        break;
                    }
                    continue;
                }
            };

            let task = match planner::decide(file, &self.record) {
                Decision::AlreadyBackedUp(file) => {
                    log::debug!("Already backed up: {}", file.identifier);
                    report.skipped += 1;
                    continue;
                }
                Decision::Copy(task) => task,
            };

            progress.file_started(&task.source.path);
            match self.copier.copy(&task) {
                Ok(bytes) => {
                    self.record.insert(RecordEntry::new(
                        &task.source.identifier,
                        &task.destination,
                        task.source.modified,
                    ))?;
                    report.copied += 1;
                    report.bytes_copied += bytes;
                    progress.file_done(bytes);
                    log::info!(
                        "Copied {} -> {}",
                        task.source.identifier,
                        task.destination.display()
                    );
                }
                Err(error) => {
                    progress.file_done(task.source.size);
                    if !record_failure(report, &self.source, task.source.path, error, progress)? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Note a per-file failure. Returns `Ok(false)` when the run has to stop
/// because the source root is gone; errors that are not per-file are fatal.
fn record_failure(
    report: &mut SyncReport,
    source: &Path,
    path: PathBuf,
    error: SyncError,
    progress: &SyncProgress,
) -> Result<bool> {
    if !error.is_per_file() {
        return Err(error);
    }

    log::warn!("{error}");
    if progress.is_drawing() {
        progress.println(&format!("Failed: {}", path.display()));
    }
    report.failures.push(FailedFile { path, error });

    if let Err(e) = validate_source(source) {
        log::warn!("Source no longer reachable: {e}");
        report.outcome = SyncOutcome::Disconnected;
        return Ok(false);
    }
    Ok(true)
}

/// Work out what a sync would copy without writing anything to `dest`
pub fn dry_run(source: &Path, dest: &Path, config: &Config) -> Result<Plan> {
    validate_destination(dest)?;
    let files = scan(source, &config.scan_options())?;
    let record = BackupRecord::load(dest)?;
    planner::plan(files, &record)
}
