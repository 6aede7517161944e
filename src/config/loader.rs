//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load, apply environment overrides, and validate.
///
/// Without a path the defaults are used as the base.
pub fn load_config(path: Option<&Path>) -> Result<GateConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GateConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment settings onto `config`.
///
/// Unparsable numeric values are ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut GateConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(list) = var("ADMIN_ALLOWED_IPS") {
        config.access.allowed_ips = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    let env_name = var("APP_ENV").or_else(|| var("RUST_ENV"));
    if let Some(env_name) = env_name {
        config.access.development_mode = env_name.eq_ignore_ascii_case("development");
    }

    if let Some(password) = var("ADMIN_PASSWORD") {
        config.admin.password = password;
    }
    if let Some(path) = var("ADMIN_AUDIT_PATH") {
        config.audit.path = path;
    }

    override_number(&var, "ADMIN_RATE_LIMIT_MAX", &mut config.rate_limit.max_requests);
    override_number(&var, "ADMIN_RATE_LIMIT_WINDOW_SECS", &mut config.rate_limit.window_secs);
    override_number(&var, "ADMIN_RATE_LIMIT_BLOCK_SECS", &mut config.rate_limit.block_secs);
    override_number(&var, "ADMIN_CSRF_TTL_SECS", &mut config.csrf.ttl_secs);
}

fn override_number<F, T>(var: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = var(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparsable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_toml_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gate.toml");
        fs::write(
            &path,
            r#"
[access]
allowed_ips = ["198.51.100.0/24", "203.0.113.5"]

[rate_limit]
max_requests = 5
window_secs = 60
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.access.allowed_ips.len(), 2);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.block_secs, 15 * 60);
        assert_eq!(config.csrf.ttl_secs, 3600);
    }

    #[test]
    fn rejects_invalid_allow_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gate.toml");
        fs::write(&path, "[access]\nallowed_ips = [\"300.1.1.1\"]\n").unwrap();

        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = GateConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("ADMIN_ALLOWED_IPS", " 10.0.0.0/8 , ,203.0.113.5"),
                ("APP_ENV", "Development"),
                ("ADMIN_RATE_LIMIT_MAX", "7"),
                ("ADMIN_CSRF_TTL_SECS", "not-a-number"),
            ]),
        );

        assert_eq!(config.access.allowed_ips, vec!["10.0.0.0/8", "203.0.113.5"]);
        assert!(config.access.development_mode);
        assert_eq!(config.rate_limit.max_requests, 7);
        assert_eq!(config.csrf.ttl_secs, 3600);
    }

    #[test]
    fn production_env_disables_development_mode() {
        let mut config = GateConfig::default();
        config.access.development_mode = true;
        apply_env_overrides(&mut config, env(&[("RUST_ENV", "production")]));
        assert!(!config.access.development_mode);
    }

    #[test]
    fn oversized_env_window_fails_validation() {
        let mut config = GateConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("ADMIN_RATE_LIMIT_WINDOW_SECS", "18446744073709551615")]),
        );
        assert_eq!(config.rate_limit.window_secs, u64::MAX);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "rate_limit.window_secs");
    }
}
