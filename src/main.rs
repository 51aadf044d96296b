use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;
use photosync::{
    dump_config, load_config, Config, SyncContext, SyncError, SyncOutcome, SyncProgress, SyncReport,
};
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let result = run();
    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(error) => {
            eprintln!("Error: {error}");

            // Show suggestions if available
            let suggestions = error.suggestions();
            if !suggestions.is_empty() {
                eprintln!("\nSuggestions:");
                for suggestion in suggestions {
                    eprintln!("  - {suggestion}");
                }
            }

            process::exit(error.exit_code());
        }
    }
}

fn build_cli() -> Command {
    Command::new("photosync")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Andreas Glaser <andreas.glaser@pm.me>")
        .about("Incremental photo backup from a mounted device into YYYY-MM folders")
        .long_about(
            "photosync copies photos and videos from a mounted device into\n\
             year-month folders and remembers what it already copied.\n\
             Example: photosync /mnt/iphone ~/Pictures/iphone\n\
             → ~/Pictures/iphone/2023-07/IMG_0001.JPG",
        )
        .arg(
            Arg::new("source")
                .help("Mounted device directory to back up from")
                .required(false)
                .value_name("SOURCE"),
        )
        .arg(
            Arg::new("dest")
                .help("Existing directory to back up into")
                .required(false)
                .value_name("DEST"),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .long("dry-run")
                .help("Show what would be copied without doing it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log each copied file; repeat for debug output")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress all output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["verbose", "progress"]),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .help("Force the progress bar even for small runs")
                .action(ArgAction::SetTrue)
                .conflicts_with("no-progress"),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .help("Disable the progress bar completely")
                .action(ArgAction::SetTrue)
                .conflicts_with("progress"),
        )
        .arg(
            Arg::new("dump-config")
                .long("dump-config")
                .help("Display current configuration settings and exit")
                .action(ArgAction::SetTrue),
        )
}

fn run() -> Result<i32, SyncError> {
    let matches = build_cli().get_matches();

    let verbose = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");
    init_logging(quiet, verbose);

    let mut config = load_config()
        .map_err(|e| {
            log::warn!("Could not load config, using defaults: {e}");
            e
        })
        .unwrap_or_else(|_| photosync::default_config());
    apply_progress_flags(&mut config, &matches);

    // Handle dump-config flag early
    if matches.get_flag("dump-config") {
        dump_config(&config)?;
        return Ok(0);
    }

    let (source, dest) = roots(&matches)?;
    let dry_run = matches.get_flag("dry-run");

    if dry_run {
        return process_dry_run(&source, &dest, &config, quiet);
    }

    let context = SyncContext::new();
    setup_signal_handlers(&context);
    process_sync(&source, &dest, &config, &context, quiet)
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    // RUST_LOG, when set, wins over the flags
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

/// Command line progress flags override the config file
fn apply_progress_flags(config: &mut Config, matches: &ArgMatches) {
    if matches.get_flag("quiet") || matches.get_flag("no-progress") {
        config.progress.enabled = false;
    } else if matches.get_flag("progress") {
        config.progress.enabled = true;
        config.progress.force_enabled = true;
    }
}

fn roots(matches: &ArgMatches) -> Result<(PathBuf, PathBuf), SyncError> {
    let source = matches.get_one::<String>("source");
    let dest = matches.get_one::<String>("dest");
    match (source, dest) {
        (Some(source), Some(dest)) => Ok((PathBuf::from(source), PathBuf::from(dest))),
        _ => Err(SyncError::validation(
            "SOURCE and DEST are required. Use --help for usage information.",
        )),
    }
}

fn process_dry_run(source: &Path, dest: &Path, config: &Config, quiet: bool) -> Result<i32, SyncError> {
    let plan = photosync::dry_run(source, dest, config)?;
    if quiet {
        return Ok(0);
    }

    for task in &plan.tasks {
        println!(
            "Would copy: {} → {}",
            task.source.identifier,
            dest.join(&task.destination).display()
        );
    }
    println!(
        "Would copy {} files ({}), {} already backed up",
        plan.tasks.len(),
        photosync::format_size(plan.total_bytes()),
        plan.already_backed_up
    );
    Ok(0)
}

fn process_sync(
    source: &Path,
    dest: &Path,
    config: &Config,
    context: &SyncContext,
    quiet: bool,
) -> Result<i32, SyncError> {
    if !quiet {
        println!("Starting a new backup");
        println!("source : {}", source.display());
        println!("dest   : {}", dest.display());
    }

    let mut progress = SyncProgress::new(config.progress.clone());
    let report = photosync::run_sync(source, dest, config, context, &mut progress)?;
    finish_report(source, &report, quiet)
}

/// Print the summary of a finished run and turn it into an exit code
fn finish_report(source: &Path, report: &SyncReport, quiet: bool) -> Result<i32, SyncError> {
    if !quiet {
        for line in report.summary() {
            println!("{line}");
        }
    }
    for failure in &report.failures {
        eprintln!("  {}: {}", failure.path.display(), failure.error);
    }

    if report.outcome == SyncOutcome::Disconnected {
        return Err(SyncError::SourceDisconnected {
            path: source.to_path_buf(),
        });
    }
    Ok(report.exit_code())
}

fn setup_signal_handlers(context: &SyncContext) {
    let context = context.clone();
    let result = ctrlc::set_handler(move || {
        if context.set_interrupted(true) {
            // Second Ctrl-C: drop in-flight temp files and the lock, then leave
            eprintln!("\nInterrupted again. Cleaning up...");
            context.cleanup_active_paths();
            process::exit(130);
        }
        eprintln!("\nInterrupted by user. Stopping after the current file (Ctrl-C again to abort)");
    });

    if let Err(e) = result {
        log::warn!("Could not install Ctrl-C handler: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photosync::BackupRecord;
    use std::fs;
    use tempfile::tempdir;

    fn test_config() -> Config {
        let mut config = photosync::default_config();
        config.progress.enabled = false;
        config
    }

    #[test]
    fn test_cli_parses_roots_and_flags() {
        let matches = build_cli()
            .try_get_matches_from(["photosync", "-vv", "-n", "/mnt/iphone", "/backup"])
            .unwrap();
        assert_eq!(matches.get_count("verbose"), 2);
        assert!(matches.get_flag("dry-run"));

        let (source, dest) = roots(&matches).unwrap();
        assert_eq!(source, PathBuf::from("/mnt/iphone"));
        assert_eq!(dest, PathBuf::from("/backup"));
    }

    #[test]
    fn test_cli_missing_dest_is_validation_error() {
        let matches = build_cli()
            .try_get_matches_from(["photosync", "/mnt/iphone"])
            .unwrap();
        let error = roots(&matches).unwrap_err();
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let result = build_cli().try_get_matches_from(["photosync", "-q", "-v", "a", "b"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_progress_flags() {
        let mut config = test_config();
        let matches = build_cli()
            .try_get_matches_from(["photosync", "--progress", "a", "b"])
            .unwrap();
        apply_progress_flags(&mut config, &matches);
        assert!(config.progress.enabled);
        assert!(config.progress.force_enabled);

        let matches = build_cli()
            .try_get_matches_from(["photosync", "--no-progress", "a", "b"])
            .unwrap();
        apply_progress_flags(&mut config, &matches);
        assert!(!config.progress.enabled);
    }

    #[test]
    fn test_process_sync_copies_and_records() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        fs::write(src.path().join("IMG_0001.JPG"), "jpeg").unwrap();

        let code = process_sync(
            src.path(),
            dest.path(),
            &test_config(),
            &SyncContext::new(),
            true,
        )
        .unwrap();
        assert_eq!(code, 0);
        assert!(BackupRecord::load(dest.path())
            .unwrap()
            .contains("IMG_0001.JPG"));
    }

    #[test]
    fn test_process_sync_missing_source() {
        let dir = tempdir().unwrap();
        let result = process_sync(
            &dir.path().join("not-mounted"),
            dir.path(),
            &test_config(),
            &SyncContext::new(),
            true,
        );
        match result {
            Err(SyncError::SourceAccess { .. }) => (),
            other => panic!("Expected SourceAccess error, got {other:?}"),
        }
    }

    #[test]
    fn test_process_sync_interrupted_exit_code() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        fs::write(src.path().join("IMG_0001.JPG"), "jpeg").unwrap();

        let context = SyncContext::new();
        context.set_interrupted(true);
        let code = process_sync(src.path(), dest.path(), &test_config(), &context, true).unwrap();
        assert_eq!(code, 130);
    }

    #[test]
    fn test_finish_report_disconnected_is_an_error() {
        let report = SyncReport {
            copied: 4,
            outcome: SyncOutcome::Disconnected,
            ..SyncReport::default()
        };
        match finish_report(Path::new("/mnt/iphone"), &report, true) {
            Err(error @ SyncError::SourceDisconnected { .. }) => {
                assert_eq!(error.exit_code(), 1);
                assert!(error.to_string().contains("/mnt/iphone"));
            }
            other => panic!("Expected SourceDisconnected error, got {other:?}"),
        }
    }

    #[test]
    fn test_finish_report_exit_codes() {
        let clean = SyncReport::default();
        assert_eq!(finish_report(Path::new("/mnt/iphone"), &clean, true).unwrap(), 0);

        let partial = SyncReport {
            failures: vec![photosync::FailedFile {
                path: PathBuf::from("/mnt/iphone/a.jpg"),
                error: SyncError::PermissionDenied {
                    path: PathBuf::from("/backup/2023-07/a.jpg"),
                },
            }],
            ..SyncReport::default()
        };
        assert_eq!(finish_report(Path::new("/mnt/iphone"), &partial, true).unwrap(), 1);
    }

    #[test]
    fn test_process_dry_run_leaves_destination_untouched() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        fs::write(src.path().join("IMG_0001.JPG"), "jpeg").unwrap();

        let code = process_dry_run(src.path(), dest.path(), &test_config(), false).unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }
}
