//! File discovery and env overrides.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::types::KernelConfig;

/// Load the configuration: defaults, then the optional file, then env
/// overrides, then validation.
///
/// # Errors
///
/// Fails on an unreadable or malformed file, or an inconsistent merged
/// configuration.
pub fn load(path: Option<&Path>) -> ConfigResult<KernelConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let parsed = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            info!(path = %path.display(), "loaded config file");
            parsed
        },
        None => KernelConfig::default(),
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Apply `ISLET_*` overrides for the operator-facing fields.
pub fn apply_env_overrides(config: &mut KernelConfig) {
    if let Some(port) = parse_env("ISLET_PORT") {
        config.port = port;
    }
    if let Some(timeout) = parse_env("ISLET_TIMEOUT") {
        config.timeout = timeout;
    }
    if let Some(max_size) = parse_env("ISLET_MAX_SIZE") {
        config.max_size = max_size;
    }
    if let Some(strict) = parse_env("ISLET_STRICT") {
        config.strict = strict;
    }
    if let Some(audit) = parse_env("ISLET_AUDIT") {
        config.audit = audit;
    }
    if let Ok(whitelist) = std::env::var("ISLET_ENV_WHITELIST") {
        config.env_whitelist = whitelist
            .split(',')
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    if let Ok(cmd) = std::env::var("ISLET_WORKER_CMD") {
        config.worker_cmd = Some(cmd.into());
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "unparsable env override ignored");
            None
        },
    }
}

fn validate(config: &KernelConfig) -> ConfigResult<()> {
    if config.cluster.max == 0 {
        return Err(ConfigError::Invalid("cluster.max must be at least 1".into()));
    }
    if config.cluster.min > config.cluster.max {
        return Err(ConfigError::Invalid(format!(
            "cluster.min ({}) exceeds cluster.max ({})",
            config.cluster.min, config.cluster.max
        )));
    }
    if config.max_size == 0 {
        return Err(ConfigError::Invalid("max_size must be positive".into()));
    }
    if config.timeout == 0 {
        return Err(ConfigError::Invalid("timeout must be positive".into()));
    }
    if config.db.limit == 0 {
        return Err(ConfigError::Invalid("db.limit must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_errors_and_absent_path_defaults() {
        assert!(load(Some(Path::new("/nonexistent/islet.toml"))).is_err());
        let config = load(None).unwrap();
        assert_eq!(config.max_size, 100_000);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_size = 50\n[cluster]\nmin = 1\nmax = 3").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.max_size, 50);
        assert_eq!(config.cluster.max, 3);
    }

    #[test]
    fn inconsistent_bounds_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cluster]\nmin = 9\nmax = 3").unwrap();
        assert!(matches!(
            load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }
}
