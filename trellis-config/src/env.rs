// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use trellis_core::AppConfig;

pub const DEFAULT_PREFIX: &str = "TRELLIS_";

/// Reads prefixed environment variables and applies them to an [`AppConfig`].
///
/// With the default prefix:
///
/// - `TRELLIS_BASE_URL` sets the base URL
/// - `TRELLIS_CORS_ALLOWED_ORIGINS`, `_ALLOWED_METHODS`, `_ALLOWED_HEADERS`
///   and `_EXPOSED_HEADERS` take comma-separated lists
/// - `TRELLIS_CORS_ALLOW_CREDENTIALS` takes `true` or `false`
/// - `TRELLIS_HEADER_X_POWERED_BY=trellis` sets the default header `x-powered-by`
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefixed variables from the process environment, prefix stripped.
    pub fn load(&self) -> HashMap<String, String> {
        self.collect_vars(env::vars())
    }

    /// Prefixed variables from `vars`, prefix stripped and keys upper-cased.
    pub fn collect_vars<I, K, V>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| {
                let key = key.as_ref().strip_prefix(self.prefix.as_str())?;
                Some((key.to_uppercase(), value.into()))
            })
            .collect()
    }

    /// Overlay `vars` (as returned by [`collect_vars`](Self::collect_vars)) onto `config`.
    pub fn apply(&self, vars: &HashMap<String, String>, config: &mut AppConfig) -> Result<()> {
        for (key, value) in vars {
            match key.as_str() {
                "BASE_URL" => config.base_url = value.clone(),
                "CORS_ALLOWED_ORIGINS" => config.cors.allowed_origins = split_list(value),
                "CORS_ALLOWED_METHODS" => config.cors.allowed_methods = split_list(value),
                "CORS_ALLOWED_HEADERS" => config.cors.allowed_headers = split_list(value),
                "CORS_EXPOSED_HEADERS" => config.cors.exposed_headers = split_list(value),
                "CORS_ALLOW_CREDENTIALS" => {
                    config.cors.allow_credentials = parse_bool(value).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            key: format!("{}{key}", self.prefix),
                            reason: format!("expected true or false, got '{value}'"),
                        }
                    })?;
                }
                other => match other.strip_prefix("HEADER_") {
                    Some(name) if !name.is_empty() => {
                        let name = name.to_lowercase().replace('_', "-");
                        config.default_headers.insert(name, value.clone());
                    }
                    _ => {
                        tracing::trace!(key = %other, "Ignoring unrecognized variable");
                    }
                },
            }
        }
        Ok(())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_vars_filters_prefix() {
        let loader = EnvLoader::default();
        let vars = loader.collect_vars([
            ("TRELLIS_BASE_URL", "/v2"),
            ("OTHER_BASE_URL", "/nope"),
            ("PATH", "/usr/bin"),
        ]);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("BASE_URL").map(String::as_str), Some("/v2"));
    }

    #[test]
    fn test_apply_overrides() {
        let loader = EnvLoader::default();
        let vars = loader.collect_vars([
            ("TRELLIS_CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("TRELLIS_CORS_ALLOW_CREDENTIALS", "true"),
            ("TRELLIS_HEADER_X_POWERED_BY", "trellis"),
        ]);

        let mut config = AppConfig::default();
        loader.apply(&vars, &mut config).unwrap();
        assert_eq!(
            config.cors.allowed_origins,
            ["https://a.example", "https://b.example"]
        );
        assert!(config.cors.allow_credentials);
        assert_eq!(
            config.default_headers.get("x-powered-by").map(String::as_str),
            Some("trellis")
        );
        assert_eq!(config.base_url, "/api");
    }

    #[test]
    fn test_invalid_bool() {
        let loader = EnvLoader::new("APP_");
        let vars = loader.collect_vars([("APP_CORS_ALLOW_CREDENTIALS", "sometimes")]);
        let err = loader.apply(&vars, &mut AppConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "APP_CORS_ALLOW_CREDENTIALS"));
    }

    #[test]
    fn test_missing_process_variables_are_ignored() {
        let loader = EnvLoader::new("TRELLIS_TEST_NONEXISTENT_99999_");
        assert!(loader.load().is_empty());
    }
}
