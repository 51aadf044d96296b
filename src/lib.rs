pub mod config;
pub mod copier;
pub mod error;
pub mod history;
pub mod planner;
pub mod progress;
pub mod record;
pub mod scanner;
pub mod signal;
pub mod sync;
pub mod utils;

pub use config::{default_config, dump_config, load_config, Config};
pub use copier::{Copier, CopyOptions};
pub use error::SyncError;
pub use planner::{decide, destination_path, month_folder, plan, CopyTask, Decision, Plan};
pub use progress::{ProgressConfig, SyncProgress};
pub use record::{BackupRecord, RecordEntry};
pub use scanner::{scan, ScanOptions, SourceFile, SourceScan};
pub use signal::{cleanup_temp_files, SyncContext, SyncLock};
pub use sync::{dry_run, run_sync, FailedFile, SyncOutcome, SyncReport, SyncSession};
pub use utils::{format_size, validate_destination, validate_source};

/// Main library result type
pub type Result<T> = std::result::Result<T, SyncError>;
