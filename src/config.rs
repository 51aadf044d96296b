use crate::copier::CopyOptions;
use crate::error::SyncError;
use crate::progress::ProgressConfig;
use crate::scanner::ScanOptions;
use crate::Result;
use configparser::ini::Ini;
use std::path::{Path, PathBuf};

const SECTION: &str = "photosync";

#[derive(Debug, Clone)]
pub struct Config {
    pub skip_extensions: Vec<String>,
    pub include_hidden: bool,
    pub follow_symlinks: bool,
    pub preserve_timestamps: bool,
    pub preserve_permissions: bool,
    pub progress: ProgressConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            skip_extensions: vec!["aae".to_string()],
            include_hidden: false,
            follow_symlinks: false,
            preserve_timestamps: true,
            preserve_permissions: false,
            progress: ProgressConfig::auto_detect(),
        }
    }
}

impl Config {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            include_hidden: self.include_hidden,
            follow_symlinks: self.follow_symlinks,
            skip_extensions: self.skip_extensions.clone(),
        }
    }

    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            preserve_timestamps: self.preserve_timestamps,
            preserve_permissions: self.preserve_permissions,
        }
    }
}

/// Get default configuration
pub fn default_config() -> Config {
    Config::default()
}

/// Load configuration from the platform config file, falling back to defaults
pub fn load_config() -> Result<Config> {
    let config_path = get_config_path()?;
    load_config_from(&config_path)
}

/// Load configuration from an explicit INI file. A missing file yields the defaults.
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Ok(default_config());
    }

    let mut conf = Ini::new();
    conf.load(config_path)
        .map_err(|e| SyncError::config(format!("Failed to parse config file: {e}")))?;

    let mut config = default_config();

    if let Some(value) = conf.get(SECTION, "skip_extensions") {
        config.skip_extensions = parse_extensions(&value);
    }

    if let Some(value) = conf.get(SECTION, "include_hidden") {
        config.include_hidden = parse_bool(&value).unwrap_or(config.include_hidden);
    }
    if let Some(value) = conf.get(SECTION, "follow_symlinks") {
        config.follow_symlinks = parse_bool(&value).unwrap_or(config.follow_symlinks);
    }
    if let Some(value) = conf.get(SECTION, "preserve_timestamps") {
        config.preserve_timestamps = parse_bool(&value).unwrap_or(config.preserve_timestamps);
    }
    if let Some(value) = conf.get(SECTION, "preserve_permissions") {
        config.preserve_permissions = parse_bool(&value).unwrap_or(config.preserve_permissions);
    }
    if let Some(value) = conf.get(SECTION, "progress") {
        config.progress.enabled = parse_bool(&value).unwrap_or(config.progress.enabled);
    }

    Ok(config)
}

/// Get the configuration file path for the current platform
pub fn get_config_path() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return Ok(PathBuf::from(appdata).join("photosync").join("config.ini"));
        }
    }

    if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
        Ok(PathBuf::from(config_dir)
            .join("photosync")
            .join("config.ini"))
    } else if let Some(home) = std::env::var_os("HOME") {
        Ok(PathBuf::from(home)
            .join(".config")
            .join("photosync")
            .join("config.ini"))
    } else {
        Err(SyncError::config("Could not determine config directory"))
    }
}

/// Parse a boolean value from INI string
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a comma separated extension list, dropping dots and empty items
fn parse_extensions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Create a sample configuration file
pub fn create_sample_config() -> String {
    r#"[photosync]
# File extensions to leave on the device (comma separated)
skip_extensions = aae

# Copy dot files found on the source
include_hidden = false

# Follow symbolic links while scanning the source
follow_symlinks = false

# Keep the original modification time on copied files (true/false)
preserve_timestamps = true

# Copy permission bits from the source
preserve_permissions = false

# Show a progress bar on interactive terminals
progress = true
"#
    .to_string()
}

/// Display the current configuration in a user-friendly format
pub fn dump_config(config: &Config) -> Result<()> {
    let config_path = get_config_path()?;

    println!("photosync Configuration");
    println!("=======================");
    println!();

    if config_path.exists() {
        println!("Config file: {} (found)", config_path.display());
    } else {
        println!(
            "Config file: {} (not found, using defaults)",
            config_path.display()
        );
    }
    println!();

    println!("Current Settings:");
    println!("----------------");
    println!("skip_extensions      = {}", config.skip_extensions.join(","));
    println!("include_hidden       = {}", config.include_hidden);
    println!("follow_symlinks      = {}", config.follow_symlinks);
    println!("preserve_timestamps  = {}", config.preserve_timestamps);
    println!("preserve_permissions = {}", config.preserve_permissions);
    println!("progress             = {}", config.progress.enabled);
    println!();

    println!("Layout of a destination directory:");
    println!("---------------------------------");
    println!("2023-07/IMG_0001.JPG      (month taken from the file modification time)");
    println!(".photosync/record.tsv     (files already backed up)");
    println!(".photosync/runs.tsv       (one line per sync run)");
    println!();

    if !config_path.exists() {
        println!("To create a configuration file:");
        println!("------------------------------");
        if let Some(parent) = config_path.parent() {
            println!("1. Create directory: mkdir -p {}", parent.display());
        }
        println!("2. Save the following as {}:", config_path.display());
        println!();
        print!("{}", create_sample_config());
    }

    Ok(())
}
