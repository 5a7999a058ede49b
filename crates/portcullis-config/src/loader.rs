//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use portcullis_oidc::OidcConfig;
use portcullis_telemetry::LogFormat;

use crate::{ConfigError, PortcullisConfig};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use portcullis_config::ConfigLoader;
///
/// # fn main() -> Result<(), portcullis_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("portcullis.toml")?
///     .with_dotenv()?
///     .with_env_prefix("PORTCULLIS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: PortcullisConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PortcullisConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = PortcullisConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use portcullis_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = PortcullisConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = PortcullisConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats, chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let file_config = Self::parse_file(&content, path)?;
        self.config = file_config;
        self.file_loaded = true;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `"toml"` or `"json"` format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use portcullis_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     http_addr = "127.0.0.1:3000"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let parsed = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };

        self.config = parsed;
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    /// For example, with prefix "PORTCULLIS":
    /// - `PORTCULLIS__SERVER__HTTP_ADDR=0.0.0.0:9000`
    /// - `PORTCULLIS__OIDC__CLIENT_SECRET=...`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if present.
    ///
    /// # Errors
    ///
    /// Never fails today; kept fallible so callers can `?` it in a chain.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(self)
    }

    /// Whether a configuration file was loaded.
    #[must_use]
    pub const fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides (if a prefix was set) and
    /// validates the final configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable does not parse or
    /// validation fails.
    pub fn load(mut self) -> Result<PortcullisConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> PortcullisConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<PortcullisConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn oidc(&mut self) -> &mut OidcConfig {
        self.config.oidc.get_or_insert_with(OidcConfig::default)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();

        match parts.as_slice() {
            // Server section
            ["SERVER", "HTTP_ADDR"] => self.config.server.http_addr = value.to_string(),
            ["SERVER", "MAX_BODY_BYTES"] => {
                self.config.server.max_body_bytes = parse_int(key, value)?;
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = parse_int(key, value)?;
            }

            // OIDC section
            ["OIDC", "ISSUER"] => self.oidc().issuer = value.to_string(),
            ["OIDC", "CLIENT_ID"] => self.oidc().client_id = value.to_string(),
            ["OIDC", "CLIENT_SECRET"] => self.oidc().client_secret = value.to_string(),
            ["OIDC", "AUDIENCE"] => self.oidc().audience = non_empty(value),
            ["OIDC", "SCOPE"] => self.oidc().scope = value.to_string(),
            ["OIDC", "AUTHORIZE_ENDPOINT"] => self.oidc().authorize_endpoint = non_empty(value),
            ["OIDC", "TOKEN_ENDPOINT"] => self.oidc().token_endpoint = non_empty(value),
            ["OIDC", "JWKS_URI"] => self.oidc().jwks_uri = non_empty(value),
            ["OIDC", "DEFAULT_RETURN_URL"] => self.oidc().default_return_url = value.to_string(),
            ["OIDC", "DEFAULT_CALLBACK_URL"] => {
                self.oidc().default_callback_url = value.to_string();
            }
            ["OIDC", "POST_LOGOUT_URL"] => self.oidc().post_logout_url = value.to_string(),
            ["OIDC", "ALLOWED_RETURN_URLS"] => {
                self.oidc().allowed_return_urls = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["OIDC", "HTTP_TIMEOUT_SECS"] => self.oidc().http_timeout_secs = parse_int(key, value)?,
            ["OIDC", "JWKS_TTL_SECS"] => self.oidc().jwks_ttl_secs = parse_int(key, value)?,
            ["OIDC", "LEEWAY_SECS"] => self.oidc().leeway_secs = parse_int(key, value)?,
            ["OIDC", "CHECK_FORWARDED_FOR"] => {
                self.oidc().check_forwarded_for = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }

            // Session section
            ["SESSION", "STATE_TTL_SECS"] => {
                self.config.session.state_ttl_secs = parse_int(key, value)?;
            }
            ["SESSION", "SESSION_TTL_SECS"] => {
                self.config.session.session_ttl_secs = parse_int(key, value)?;
            }
            ["SESSION", "SWEEP_INTERVAL_SECS"] => {
                self.config.session.sweep_interval_secs = parse_int(key, value)?;
            }
            ["SESSION", "STATE_COOKIE"] => self.config.session.state_cookie = value.to_string(),
            ["SESSION", "SESSION_COOKIE"] => self.config.session.session_cookie = value.to_string(),
            ["SESSION", "CSRF_COOKIE"] => self.config.session.csrf_cookie = value.to_string(),
            ["SESSION", "CSRF_HEADER"] => self.config.session.csrf_header = value.to_string(),

            // Encoding section
            ["ENCODING", "PRETTY_JSON"] => {
                self.config.encoding.pretty_json = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }

            // Logging section
            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => self.config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI"] => {
                self.config.logging.ansi = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const OIDC_TOML: &str = r#"
        [server]
        http_addr = "127.0.0.1:3000"

        [oidc]
        issuer = "https://tenant.example.com/"
        client_id = "client"
        client_secret = "secret"
        default_return_url = "https://app.example.com/"
        default_callback_url = "https://app.example.com/callback"
        post_logout_url = "https://app.example.com/"
        allowed_return_urls = ["https://app.example.com/"]

        [session]
        state_ttl_secs = 120

        [logging]
        level = "warn"
        format = "pretty"
    "#;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert!(config.oidc.is_none());
    }

    #[test]
    fn test_loader_presets() {
        let dev = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(dev.logging.format, LogFormat::Pretty);

        let prod = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(prod.logging.format, LogFormat::Json);
        assert!(!prod.encoding.pretty_json);
    }

    #[test]
    fn test_loader_with_string_toml() {
        let config = ConfigLoader::new()
            .with_string(OIDC_TOML, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:3000");
        assert_eq!(config.session.state_ttl_secs, 120);
        assert_eq!(config.session.session_ttl_secs, 86_400);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        let oidc = config.oidc.unwrap();
        assert_eq!(oidc.client_id, "client");
        assert_eq!(oidc.scope, "openid profile email");
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"server": {"http_addr": "127.0.0.1:3000"}, "encoding": {"pretty_json": true}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:3000");
        assert!(config.encoding.pretty_json);
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result = ConfigLoader::new().with_string("[metrics]\nenabled = true", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_unsupported_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(OIDC_TOML.as_bytes()).unwrap();

        let loader = ConfigLoader::new().with_file(file.path()).unwrap();
        assert!(loader.file_loaded());
        let config = loader.load().unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/portcullis.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let loader = ConfigLoader::new()
            .with_optional_file("/nonexistent/portcullis.toml")
            .unwrap();
        assert!(!loader.file_loaded());
        assert_eq!(loader.load().unwrap().server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_file_with_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_config_fails_load_but_not_unvalidated() {
        let loader = ConfigLoader::new()
            .with_string("[session]\nstate_ttl_secs = 0", "toml")
            .unwrap();
        let config = loader.load_unvalidated();
        assert_eq!(config.session.state_ttl_secs, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_apply_env_var_server_and_session() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__SERVER__HTTP_ADDR", "192.168.1.1:9000", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__SESSION__SESSION_TTL_SECS", "600", "TEST")
            .unwrap();
        assert_eq!(loader.config.server.http_addr, "192.168.1.1:9000");
        assert_eq!(loader.config.session.session_ttl_secs, 600);
    }

    #[test]
    fn test_apply_env_var_creates_oidc_section() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__OIDC__ISSUER", "https://tenant.example.com/", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__OIDC__CLIENT_ID", "client", "TEST")
            .unwrap();
        loader
            .apply_env_var(
                "TEST__OIDC__ALLOWED_RETURN_URLS",
                "http://localhost:8080/, https://app.example.com/",
                "TEST",
            )
            .unwrap();
        loader
            .apply_env_var("TEST__OIDC__CHECK_FORWARDED_FOR", "yes", "TEST")
            .unwrap();

        let oidc = loader.config.oidc.clone().unwrap();
        assert_eq!(oidc.issuer, "https://tenant.example.com/");
        assert_eq!(oidc.allowed_return_urls.len(), 2);
        assert!(oidc.check_forwarded_for);
        loader.config.validate().unwrap();
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        assert!(loader
            .apply_env_var("TEST__SESSION__STATE_TTL_SECS", "soon", "TEST")
            .is_err());
        assert!(loader
            .apply_env_var("TEST__LOGGING__FORMAT", "xml", "TEST")
            .is_err());
        assert!(loader.apply_env_var("TESTSERVER", "x", "TEST").is_err());
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__NOPE__KEY", "value", "TEST")
            .unwrap();
    }
}
