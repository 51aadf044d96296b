use chrono::{Local, TimeZone};
use filetime::FileTime;
use photosync::{
    default_config, dry_run, run_sync, BackupRecord, Config, SyncContext, SyncOutcome,
    SyncProgress, SyncSession,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn config() -> Config {
    let mut config = default_config();
    config.progress.enabled = false;
    config
}

/// Write `content` to `root/relative` with a noon local-time mtime on the given day
fn photo(root: &Path, relative: &str, content: &str, (y, m, d): (i32, u32, u32)) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    let when = Local.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(when.timestamp(), 0)).unwrap();
}

fn sync_with(
    source: &Path,
    dest: &Path,
    config: &Config,
    context: &SyncContext,
) -> photosync::SyncReport {
    run_sync(source, dest, config, context, &mut SyncProgress::hidden()).unwrap()
}

fn sync(source: &Path, dest: &Path) -> photosync::SyncReport {
    sync_with(source, dest, &config(), &SyncContext::new())
}

#[test]
fn photos_land_in_their_month_folder() {
    let device = tempdir().unwrap();
    let backup = tempdir().unwrap();
    photo(device.path(), "DCIM/100APPLE/IMG_001.jpg", "july", (2023, 7, 15));
    photo(device.path(), "DCIM/100APPLE/IMG_002.jpg", "new year", (2024, 1, 1));

    let report = sync(device.path(), backup.path());
    assert_eq!(report.copied, 2);
    assert_eq!(report.outcome, SyncOutcome::Completed);

    assert_eq!(
        fs::read_to_string(backup.path().join("2023-07/IMG_001.jpg")).unwrap(),
        "july"
    );
    assert_eq!(
        fs::read_to_string(backup.path().join("2024-01/IMG_002.jpg")).unwrap(),
        "new year"
    );

    // Timestamps survive the copy
    let copied = fs::metadata(backup.path().join("2023-07/IMG_001.jpg")).unwrap();
    let original = fs::metadata(device.path().join("DCIM/100APPLE/IMG_001.jpg")).unwrap();
    assert_eq!(copied.modified().unwrap(), original.modified().unwrap());
}

#[test]
fn rerun_copies_nothing() {
    let device = tempdir().unwrap();
    let backup = tempdir().unwrap();
    photo(device.path(), "IMG_001.jpg", "a", (2023, 7, 15));
    photo(device.path(), "IMG_002.jpg", "b", (2023, 8, 2));

    assert_eq!(sync(device.path(), backup.path()).copied, 2);
    let record_before = fs::read_to_string(BackupRecord::record_path(backup.path())).unwrap();

    let report = sync(device.path(), backup.path());
    assert_eq!(report.copied, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.exit_code(), 0);

    let record_after = fs::read_to_string(BackupRecord::record_path(backup.path())).unwrap();
    assert_eq!(record_before, record_after);
}

#[test]
fn new_photos_are_picked_up_incrementally() {
    let device = tempdir().unwrap();
    let backup = tempdir().unwrap();
    photo(device.path(), "IMG_001.jpg", "a", (2023, 7, 15));
    sync(device.path(), backup.path());

    photo(device.path(), "IMG_002.jpg", "b", (2023, 7, 16));
    let report = sync(device.path(), backup.path());
    assert_eq!(report.copied, 1);
    assert_eq!(report.skipped, 1);
    assert!(backup.path().join("2023-07/IMG_002.jpg").exists());
}

#[test]
fn interrupted_run_resumes_with_remaining_files() {
    let device = tempdir().unwrap();
    let backup = tempdir().unwrap();
    let names = ["IMG_001.jpg", "IMG_002.jpg", "IMG_003.jpg", "IMG_004.jpg", "IMG_005.jpg"];
    for name in names {
        photo(device.path(), name, name, (2023, 7, 15));
    }

    // Ctrl-C arrives while the third file is being picked up
    let context = SyncContext::new();
    let session = SyncSession::open(device.path(), backup.path(), &config(), &context).unwrap();
    let ctrl_c = context.clone();
    let files = session.scan().unwrap().enumerate().map(move |(index, file)| {
        if index == 2 {
            ctrl_c.set_interrupted(true);
        }
        file
    });
    let report = session.run(files, &mut SyncProgress::hidden()).unwrap();
    assert_eq!(report.outcome, SyncOutcome::Interrupted);
    assert_eq!(report.copied, 2);
    assert_eq!(report.exit_code(), 130);

    let record = BackupRecord::load(backup.path()).unwrap();
    assert_eq!(record.len(), 2);
    assert!(record.contains("IMG_001.jpg"));
    assert!(record.contains("IMG_002.jpg"));
    assert!(!backup.path().join("2023-07/IMG_003.jpg").exists());

    let report = sync(device.path(), backup.path());
    assert_eq!(report.copied, 3);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.outcome, SyncOutcome::Completed);
    for name in names {
        assert_eq!(
            fs::read_to_string(backup.path().join("2023-07").join(name)).unwrap(),
            name
        );
    }
    assert_eq!(BackupRecord::load(backup.path()).unwrap().len(), 5);
}

#[test]
fn sidecars_and_hidden_files_are_skipped() {
    let device = tempdir().unwrap();
    let backup = tempdir().unwrap();
    photo(device.path(), "IMG_001.HEIC", "heic", (2023, 7, 15));
    photo(device.path(), "IMG_001.AAE", "edits", (2023, 7, 15));
    photo(device.path(), ".Trashes/IMG_009.jpg", "trash", (2023, 7, 15));

    let report = sync(device.path(), backup.path());
    assert_eq!(report.copied, 1);
    assert!(backup.path().join("2023-07/IMG_001.HEIC").exists());
    assert!(!backup.path().join("2023-07/IMG_001.AAE").exists());
    assert!(!backup.path().join("2023-07/IMG_009.jpg").exists());
}

#[test]
fn dry_run_matches_real_run() {
    let device = tempdir().unwrap();
    let backup = tempdir().unwrap();
    photo(device.path(), "IMG_001.jpg", "abc", (2023, 7, 15));
    photo(device.path(), "IMG_002.jpg", "de", (2023, 9, 1));

    let plan = dry_run(device.path(), backup.path(), &config()).unwrap();
    assert_eq!(plan.tasks.len(), 2);
    assert_eq!(plan.total_bytes(), 5);
    assert!(fs::read_dir(backup.path()).unwrap().next().is_none());

    let report = sync(device.path(), backup.path());
    assert_eq!(report.copied, plan.tasks.len());
    assert_eq!(report.bytes_copied, plan.total_bytes());

    let plan = dry_run(device.path(), backup.path(), &config()).unwrap();
    assert!(plan.tasks.is_empty());
    assert_eq!(plan.already_backed_up, 2);
}
