use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Adapter server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Address the DAP listener binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// DAP listener port; 0 picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Stepping backend: `console` or `script`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Port of the `START` trigger listener. Disabled when unset.
    #[serde(default)]
    pub trigger_port: Option<u16>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_backend() -> String {
    "console".to_string()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backend: default_backend(),
            trigger_port: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Log file path. Defaults to the platform log directory.
    pub file: Option<PathBuf>,
}

/// Top-level dapbridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub log: LogConfig,
}
