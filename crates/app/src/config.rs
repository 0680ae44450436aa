//! Application configuration.
//!
//! Loaded with the `config` crate, later sources overriding earlier ones:
//! 1. built-in defaults,
//! 2. an optional TOML, YAML or JSON file,
//! 3. `STOREFRONT__*` environment variables, with `__` between nested keys
//!    (`STOREFRONT__SESSION__MAX_ATTEMPTS=5`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use storefront_domain::SessionSettings;
use url::Url;

/// Prefix of environment variables read by [`AppConfig::load`].
pub const ENV_PREFIX: &str = "STOREFRONT";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// No backend URL was configured.
    #[error("backend_url is not set")]
    MissingBackendUrl,

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything needed to build a [`crate::SessionContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the commerce backend; the exchange endpoint is
    /// `<backend_url>/auth/token`.
    pub backend_url: Option<Url>,
    /// Persist the token to a file so it survives restarts.
    pub durable_storage: bool,
    /// Directory for the session file. Defaults to the platform's local
    /// data directory.
    pub storage_dir: Option<PathBuf>,
    /// Timeout for one exchange request.
    pub request_timeout_secs: u64,
    /// Tracing filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Token lifecycle tunables.
    pub session: SessionSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            durable_storage: true,
            storage_dir: None,
            request_timeout_secs: 10,
            log_filter: "info".to_string(),
            session: SessionSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `file` (if given and present) and the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a value is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(file, None)
    }

    /// Like [`Self::load`], reading `STOREFRONT__*` variables from `env`
    /// instead of the process environment when given.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a value is invalid.
    pub fn load_with_env(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that deserialize fine but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.backend_url
            && !matches!(url.scheme(), "http" | "https")
        {
            return Err(ConfigError::Invalid(format!(
                "backend_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.session.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "session.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.session.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.namespace must not be empty".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured backend URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingBackendUrl` if none is set.
    pub fn backend_url(&self) -> Result<&Url, ConfigError> {
        self.backend_url.as_ref().ok_or(ConfigError::MissingBackendUrl)
    }

    /// Exchange request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = AppConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(matches!(
            config.backend_url(),
            Err(ConfigError::MissingBackendUrl)
        ));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storefront.toml");
        std::fs::write(
            &path,
            r#"
backend_url = "https://shop.example.com/api"
request_timeout_secs = 3

[session]
namespace = "acme"
renewal_threshold_secs = 600
remember_me = true
"#,
        )
        .unwrap();

        let config = AppConfig::load_with_env(Some(&path), env(&[])).unwrap();

        assert_eq!(
            config.backend_url().unwrap().as_str(),
            "https://shop.example.com/api"
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.session.namespace, "acme");
        assert_eq!(config.session.renewal_threshold_secs, 600);
        assert!(config.session.remember_me);
        assert_eq!(config.session.max_attempts, 3);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storefront.json");
        std::fs::write(
            &path,
            r#"{"backend_url": "https://a.example.com", "session": {"max_attempts": 2}}"#,
        )
        .unwrap();

        let config = AppConfig::load_with_env(
            Some(&path),
            env(&[
                ("STOREFRONT__BACKEND_URL", "https://b.example.com"),
                ("STOREFRONT__SESSION__MAX_ATTEMPTS", "5"),
                ("STOREFRONT__DURABLE_STORAGE", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.backend_url().unwrap().as_str(),
            "https://b.example.com/"
        );
        assert_eq!(config.session.max_attempts, 5);
        assert!(!config.durable_storage);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let config =
            AppConfig::load_with_env(Some(&dir.path().join("absent.toml")), env(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = AppConfig::load_with_env(
            None,
            env(&[("STOREFRONT__SESSION__MAX_ATTEMPTS", "0")]),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result =
            AppConfig::load_with_env(None, env(&[("STOREFRONT__BACKEND_URL", "ftp://shop")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = AppConfig::load_with_env(None, env(&[("STOREFRONT__BACKEND_URL", "::")]));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
