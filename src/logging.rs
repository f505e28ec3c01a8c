//! Log file setup for the binary.
//!
//! Logs always go to a file: the console backend owns stdin and stdout.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use dapbridge_config::{LogConfig, LogLevel, PlatformPaths};
use tracing_subscriber::EnvFilter;

/// Maximum size of a single log file before rotation (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated log files to retain.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

const LOG_FILE_NAME: &str = "dapbridge.log";

/// Configured log file, or `dapbridge.log` in the platform log directory.
pub fn log_file_path(config: &LogConfig, paths: &dyn PlatformPaths) -> PathBuf {
    config
        .file
        .clone()
        .unwrap_or_else(|| paths.log_dir().join(LOG_FILE_NAME))
}

/// Filter directive: a non-empty `RUST_LOG` wins over the configured level.
pub fn filter_directive(level: LogLevel, rust_log: Option<&str>) -> String {
    match rust_log.map(str::trim) {
        Some(env) if !env.is_empty() => env.to_string(),
        _ => level.as_filter().to_string(),
    }
}

pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Rotate `log_path` once it reaches `max_size` bytes.
///
/// ```text
///   dapbridge.log   -> dapbridge.log.1
///   dapbridge.log.1 -> dapbridge.log.2
///   dapbridge.log.<max_files> is deleted
/// ```
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let Ok(metadata) = fs::metadata(log_path) else {
        return Ok(());
    };
    if metadata.len() < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

/// Install the global subscriber writing to `log_path`.
pub fn init(log_path: &Path, directive: &str) -> Result<()> {
    ensure_log_dir(log_path)
        .with_context(|| format!("failed to create log directory for {}", log_path.display()))?;
    rotate_log_files(log_path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)
        .with_context(|| format!("failed to rotate {}", log_path.display()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install tracing subscriber")
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}.{index}"))
}
