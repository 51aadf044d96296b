#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub enabled: bool,
    pub force_enabled: bool,
    pub is_interactive: bool,
    pub min_files_threshold: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            force_enabled: false,
            is_interactive: std::io::stderr().is_terminal(),
            min_files_threshold: 10,
        }
    }
}

impl ProgressConfig {
    pub fn auto_detect() -> Self {
        // Disable in CI environments
        if is_ci_environment() {
            Self {
                enabled: false,
                is_interactive: false,
                ..Self::default()
            }
        } else {
            Self::default()
        }
    }

    pub fn should_show_progress(&self, file_count: usize) -> bool {
        if !self.enabled || !self.is_interactive {
            return false;
        }
        self.force_enabled || file_count >= self.min_files_threshold
    }
}

/// Progress display for one sync run. A no-op unless the `progress`
/// feature is enabled and [`SyncProgress::start`] decided to draw.
pub struct SyncProgress {
    config: ProgressConfig,
    #[cfg(feature = "progress")]
    bar: Option<ProgressBar>,
}

impl SyncProgress {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "progress")]
            bar: None,
        }
    }

    /// A progress reporter that never draws
    pub fn hidden() -> Self {
        Self::new(ProgressConfig {
            enabled: false,
            ..ProgressConfig::default()
        })
    }

    /// Whether the caller should spend a counting pass to size the bar
    pub fn wants_total(&self) -> bool {
        cfg!(feature = "progress") && self.config.enabled && self.config.is_interactive
    }

    pub fn start(&mut self, files_to_copy: usize, bytes_to_copy: u64) {
        if !self.config.should_show_progress(files_to_copy) {
            return;
        }
        #[cfg(feature = "progress")]
        {
            let bar = ProgressBar::new(bytes_to_copy);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "syncing [{bar:32.cyan/blue}] {bytes}/{total_bytes} • {bytes_per_sec} • ETA {eta} • {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            self.bar = Some(bar);
        }
        #[cfg(not(feature = "progress"))]
        let _ = bytes_to_copy;
    }

    pub fn file_started(&self, path: &Path) {
        #[cfg(feature = "progress")]
        {
            if let Some(ref bar) = self.bar {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("...");
                bar.set_message(name.to_string());
            }
        }
        #[cfg(not(feature = "progress"))]
        let _ = path;
    }

    pub fn file_done(&self, bytes: u64) {
        #[cfg(feature = "progress")]
        {
            if let Some(ref bar) = self.bar {
                bar.inc(bytes);
            }
        }
        #[cfg(not(feature = "progress"))]
        let _ = bytes;
    }

    /// Print a line without tearing the bar
    pub fn println(&self, line: &str) {
        #[cfg(feature = "progress")]
        {
            if let Some(ref bar) = self.bar {
                bar.println(line);
                return;
            }
        }
        eprintln!("{line}");
    }

    pub fn is_drawing(&self) -> bool {
        #[cfg(feature = "progress")]
        let drawing = self.bar.is_some();
        #[cfg(not(feature = "progress"))]
        let drawing = false;
        drawing
    }

    pub fn finish(&mut self) {
        #[cfg(feature = "progress")]
        {
            if let Some(bar) = self.bar.take() {
                bar.finish_and_clear();
            }
        }
    }
}

/// Check if we're running in a CI environment
fn is_ci_environment() -> bool {
    std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok()
        || std::env::var("GITLAB_CI").is_ok()
        || std::env::var("TRAVIS").is_ok()
        || std::env::var("CIRCLECI").is_ok()
        || std::env::var("JENKINS_URL").is_ok()
        || std::env::var("BUILDKITE").is_ok()
}
