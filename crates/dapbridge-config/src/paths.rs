use std::path::PathBuf;

use crate::error::ConfigError;

const APP_DIR: &str = "dapbridge";

/// Standard directories used by dapbridge.
pub trait PlatformPaths: Send + Sync {
    /// Configuration directory (`~/.config/dapbridge`).
    fn config_dir(&self) -> PathBuf;
    /// Data directory (`~/.local/share/dapbridge`).
    fn data_dir(&self) -> PathBuf;
    /// Log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

/// [`PlatformPaths`] rooted at the user's home directory.
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Resolve the home directory via `dirs`, falling back to `$HOME`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if no home directory exists.
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or_else(|| ConfigError::NotFound(PathBuf::from("~")))?;
        Ok(Self { home })
    }

    /// Paths rooted at an explicit directory instead of `$HOME`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join(APP_DIR)
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join(APP_DIR)
    }
}
