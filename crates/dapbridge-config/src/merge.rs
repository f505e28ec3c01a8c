use crate::config::Config;
use crate::error::ConfigError;

/// Merge an overlay TOML fragment on top of a base [`Config`].
///
/// Keys present in `overlay_toml` win; missing keys keep their `base`
/// values. Both sides go through [`toml::Value`] tables so nested
/// sections merge key by key.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut base_val =
        toml::Value::try_from(base).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let overlay_val: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    merge_values(&mut base_val, &overlay_val);

    base_val
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
}

/// Tables merge recursively; any other value is replaced.
fn merge_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_val) => merge_values(base_val, val),
                    None => {
                        base_table.insert(key.clone(), val.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn merge_empty_overlay_returns_base() {
        let base = Config::default();
        let merged = merge_configs(&base, "").expect("merge empty");
        assert_eq!(merged, base);
    }

    #[test]
    fn merge_overrides_single_key() {
        let base = Config::default();
        let merged = merge_configs(&base, "[adapter]\nport = 4711\n").expect("merge");
        assert_eq!(merged.adapter.port, 4711);
        assert_eq!(merged.adapter.host, "127.0.0.1");
        assert_eq!(merged.log, base.log);
    }

    #[test]
    fn merge_adds_optional_field() {
        let base = Config::default();
        let merged = merge_configs(&base, "[adapter]\ntrigger_port = 9001\n").expect("merge");
        assert_eq!(merged.adapter.trigger_port, Some(9001));
    }

    #[test]
    fn merge_stacks_overlays() {
        let global = merge_configs(&Config::default(), "[log]\nlevel = \"debug\"\n").unwrap();
        let project = merge_configs(&global, "[adapter]\nbackend = \"script\"\n").unwrap();
        assert_eq!(project.log.level, LogLevel::Debug);
        assert_eq!(project.adapter.backend, "script");
    }

    #[test]
    fn merge_invalid_overlay_returns_parse_error() {
        let result = merge_configs(&Config::default(), "{{invalid}}");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn merge_wrong_type_returns_parse_error() {
        let result = merge_configs(&Config::default(), "[adapter]\nport = \"high\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
