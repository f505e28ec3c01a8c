pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod paths;
pub mod validate;

pub use config::{AdapterConfig, Config, LogConfig, LogLevel};
pub use error::ConfigError;
pub use load::{apply_env_overrides, load_config, load_from_str};
pub use paths::{DefaultPaths, PlatformPaths};
