use std::path::PathBuf;
use thiserror::Error;

/// Why a [`Config`](crate::Config) could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A path dapbridge needs (home, config dir) does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("cannot write default config: {0}")]
    CreateDefault(String),

    #[error("invalid TOML: {0}")]
    Parse(String),

    /// `field` is a dotted path such as `adapter.port`, or the name of
    /// the environment variable that supplied the value.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
