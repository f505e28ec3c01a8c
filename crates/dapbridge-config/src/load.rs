use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::first_error;

const CONFIG_FILE: &str = "config.toml";

/// Directory holding a project's overlay, searched upward from the cwd.
const PROJECT_DIR: &str = ".dapbridge";

/// Written to `config.toml` the first time dapbridge runs.
const STARTER_CONFIG: &str = r#"# dapbridge configuration
#
# Every setting below is commented out and shows its default value.
# A project can override any of them in .dapbridge/config.toml.

# [adapter]
# host = "127.0.0.1"
# port = 9000
# backend = "console"     # or "script"
# trigger_port = 9001     # send START here to stop the program

# [log]
# level = "info"
# file = "/tmp/dapbridge.log"
"#;

/// Build the effective configuration.
///
/// Layers, later wins: built-in defaults, `config_dir/config.toml`
/// (created with a commented starter file when absent), then the closest
/// `.dapbridge/config.toml` at or above `project_dir`. The merged result
/// is validated before it is returned.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global = ensure_global_file(config_dir)?;
    let project = project_dir.and_then(locate_project_overlay);

    let mut config = Config::default();
    for path in std::iter::once(global).chain(project) {
        let Some(overlay) = read_overlay(&path)? else {
            continue;
        };
        tracing::debug!(path = %path.display(), "applying config overlay");
        config = merge_configs(&config, &overlay)?;
    }

    first_error(&config)?;
    Ok(config)
}

fn ensure_global_file(config_dir: &Path) -> Result<PathBuf, ConfigError> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(path);
    }
    fs::create_dir_all(config_dir)?;
    fs::write(&path, STARTER_CONFIG).map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
    tracing::info!(path = %path.display(), "wrote starter config");
    Ok(path)
}

/// File contents, or `None` when it holds nothing but comments.
fn read_overlay(path: &Path) -> Result<Option<String>, ConfigError> {
    let text = fs::read_to_string(path)?;
    let has_settings = text
        .lines()
        .map(str::trim)
        .any(|l| !l.is_empty() && !l.starts_with('#'));
    Ok(has_settings.then_some(text))
}

fn locate_project_overlay(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

/// Parse and validate a complete config document.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config =
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    first_error(&config)?;
    Ok(config)
}

/// Apply `DAPBRIDGE_HOST`, `DAPBRIDGE_PORT` and `DAPBRIDGE_BACKEND`
/// overrides read through `var`, then re-validate.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] for an unparsable port or an
/// override that leaves the config invalid.
pub fn apply_env_overrides<F>(mut config: Config, var: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = var("DAPBRIDGE_HOST") {
        config.adapter.host = host;
    }
    if let Some(port) = var("DAPBRIDGE_PORT") {
        config.adapter.port = port.trim().parse().map_err(|_| ConfigError::Validation {
            field: "DAPBRIDGE_PORT".to_string(),
            message: format!("'{port}' is not a valid port"),
        })?;
    }
    if let Some(backend) = var("DAPBRIDGE_BACKEND") {
        config.adapter.backend = backend;
    }
    first_error(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::LogLevel;
    use tempfile::tempdir;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn first_run_writes_starter_file() {
        let home = tempdir().unwrap();
        let dir = home.path().join("cfg");

        assert_eq!(load_config(&dir, None).unwrap(), Config::default());
        let written = fs::read_to_string(dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(written, STARTER_CONFIG);
    }

    #[test]
    fn starter_file_changes_nothing() {
        let home = tempdir().unwrap();
        let path = home.path().join(CONFIG_FILE);
        write(&path, STARTER_CONFIG);
        assert_eq!(read_overlay(&path).unwrap(), None);
    }

    #[test]
    fn global_file_overrides_defaults() {
        let home = tempdir().unwrap();
        let dir = home.path().join("cfg");
        write(&dir.join(CONFIG_FILE), "[adapter]\nport = 4711\n");

        let config = load_config(&dir, None).unwrap();
        assert_eq!(config.adapter.port, 4711);
        assert_eq!(config.adapter.backend, "console");
    }

    #[test]
    fn project_overlay_wins_over_global() {
        let home = tempdir().unwrap();
        let dir = home.path().join("cfg");
        write(
            &dir.join(CONFIG_FILE),
            "[adapter]\nport = 4711\n[log]\nlevel = \"debug\"\n",
        );
        let project = home.path().join("work");
        write(&project.join(PROJECT_DIR).join(CONFIG_FILE), "[adapter]\nport = 5678\n");
        let cwd = project.join("src").join("bin");
        fs::create_dir_all(&cwd).unwrap();

        let config = load_config(&dir, Some(&cwd)).unwrap();
        assert_eq!(config.adapter.port, 5678);
        assert_eq!(config.log.level, LogLevel::Debug);
    }

    #[test]
    fn project_overlay_is_validated() {
        let home = tempdir().unwrap();
        let project = home.path().join("work");
        write(
            &project.join(PROJECT_DIR).join(CONFIG_FILE),
            "[adapter]\nbackend = \"gdb\"\n",
        );

        let err = load_config(&home.path().join("cfg"), Some(&project)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "adapter.backend"));
    }

    #[test]
    fn overlay_search_stops_at_nearest() {
        let home = tempdir().unwrap();
        let outer = home.path().join("outer");
        let inner = outer.join("inner");
        write(&outer.join(PROJECT_DIR).join(CONFIG_FILE), "");
        write(&inner.join(PROJECT_DIR).join(CONFIG_FILE), "");

        let found = locate_project_overlay(&inner.join("deep")).unwrap();
        assert_eq!(found, inner.join(PROJECT_DIR).join(CONFIG_FILE));
        assert!(locate_project_overlay(&home.path().join("elsewhere")).is_none());
    }

    #[test]
    fn from_str_accepts_and_rejects() {
        let config = load_from_str("[adapter]\nbackend = \"script\"\n").unwrap();
        assert_eq!(config.adapter.backend, "script");
        assert!(matches!(load_from_str("{{bad}}"), Err(ConfigError::Parse(_))));
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_apply() {
        let config = apply_env_overrides(
            Config::default(),
            vars(&[("DAPBRIDGE_PORT", "7000"), ("DAPBRIDGE_BACKEND", "script")]),
        )
        .unwrap();
        assert_eq!(config.adapter.port, 7000);
        assert_eq!(config.adapter.backend, "script");
        assert_eq!(config.adapter.host, "127.0.0.1");
    }

    #[test]
    fn env_overrides_reject_bad_port() {
        let err = apply_env_overrides(Config::default(), vars(&[("DAPBRIDGE_PORT", "ninety")]))
            .unwrap_err();
        assert!(err.to_string().contains("DAPBRIDGE_PORT"));
    }

    #[test]
    fn env_overrides_revalidate() {
        let err = apply_env_overrides(Config::default(), vars(&[("DAPBRIDGE_HOST", "")]))
            .unwrap_err();
        assert!(err.to_string().contains("adapter.host"));
    }
}
