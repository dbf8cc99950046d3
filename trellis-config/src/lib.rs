// Configuration loading for the Trellis framework
//
// Builds a `trellis_core::AppConfig` from a JSON or TOML file, then overlays
// prefixed environment variables.

pub mod env;
pub mod error;
pub mod loader;

pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use trellis_core::AppConfig;

/// Layered loader: defaults, then a file, then the environment.
///
/// ```no_run
/// use trellis_config::AppConfigLoader;
///
/// let config = AppConfigLoader::new()
///     .with_file("config/app.toml")
///     .with_dotenv()
///     .load()
///     .expect("invalid configuration");
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfigLoader {
    file: Option<PathBuf>,
    env: Option<EnvLoader>,
    dotenv: Option<Option<PathBuf>>,
}

impl AppConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from a `.json` or `.toml` file.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Overlay variables with the default `TRELLIS_` prefix.
    pub fn with_env(self) -> Self {
        self.with_env_loader(EnvLoader::default())
    }

    pub fn with_env_loader(mut self, loader: EnvLoader) -> Self {
        self.env = Some(loader);
        self
    }

    /// Load `.env` from the working directory (if present) before reading the
    /// environment. Implies [`with_env`](Self::with_env) unless a loader is set.
    pub fn with_dotenv(mut self) -> Self {
        self.dotenv = Some(None);
        self.env.get_or_insert_with(EnvLoader::default);
        self
    }

    /// Like [`with_dotenv`](Self::with_dotenv) with an explicit file, which must exist.
    pub fn with_dotenv_file(mut self, path: impl AsRef<Path>) -> Self {
        self.dotenv = Some(Some(path.as_ref().to_path_buf()));
        self.env.get_or_insert_with(EnvLoader::default);
        self
    }

    /// Build and validate the configuration from the process environment.
    pub fn load(&self) -> Result<AppConfig> {
        match &self.dotenv {
            Some(Some(path)) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            Some(None) => {
                // A missing .env is not an error.
                dotenvy::dotenv().ok();
            }
            None => {}
        }

        let vars = self
            .env
            .as_ref()
            .map(EnvLoader::load)
            .unwrap_or_default();
        self.load_with_vars(&vars)
    }

    /// Build and validate the configuration against an explicit variable set,
    /// as produced by [`EnvLoader::collect_vars`].
    pub fn load_with_vars(&self, vars: &HashMap<String, String>) -> Result<AppConfig> {
        let mut config = match &self.file {
            Some(path) => from_value(ConfigLoader::auto(path)?.load_file(path)?)?,
            None => AppConfig::default(),
        };

        if let Some(loader) = &self.env {
            loader.apply(vars, &mut config)?;
        }

        config.validate()?;
        tracing::debug!(base_url = %config.base_url, "Configuration loaded");
        Ok(config)
    }
}

/// Parse an `AppConfig` from a JSON or TOML document. Missing keys keep
/// their defaults.
pub fn parse_app_config(content: &str, format: FileFormat) -> Result<AppConfig> {
    let config = from_value(ConfigLoader::new(format).parse(content)?)?;
    config.validate()?;
    Ok(config)
}

fn from_value(value: Value) -> Result<AppConfig> {
    serde_json::from_value(value).map_err(|e| ConfigError::ParseError(e.to_string()))
}
