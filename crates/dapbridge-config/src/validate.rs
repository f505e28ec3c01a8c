use crate::config::Config;
use crate::error::ConfigError;

/// Backend names the engine knows how to build.
pub const KNOWN_BACKENDS: [&str; 2] = ["console", "script"];

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let adapter = &config.adapter;

    if adapter.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            field: "adapter.host".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let backend = adapter.backend.trim().to_ascii_lowercase();
    if !KNOWN_BACKENDS.contains(&backend.as_str()) {
        errors.push(ConfigError::Validation {
            field: "adapter.backend".to_string(),
            message: format!(
                "unknown backend '{}', expected one of {}",
                adapter.backend,
                KNOWN_BACKENDS.join(", ")
            ),
        });
    }

    // Port 0 means "any free port", so only a fixed, shared port clashes.
    if let Some(trigger) = adapter.trigger_port {
        if trigger != 0 && trigger == adapter.port {
            errors.push(ConfigError::Validation {
                field: "adapter.trigger_port".to_string(),
                message: format!("must differ from adapter.port ({trigger})"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collapse a validation result into its first error.
pub(crate) fn first_error(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}
