//! Main configuration types.
//!
//! This module provides the top-level [`PortcullisConfig`] struct.

use portcullis_core::Encoding;
use portcullis_oidc::{OidcConfig, OidcError, ReturnAllowList, SessionConfig};
use portcullis_telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{ConfigError, ServerConfig};

/// Complete service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use portcullis_config::PortcullisConfig;
///
/// let config = PortcullisConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.oidc.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PortcullisConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Identity provider configuration. Required for the login routes.
    #[serde(default)]
    pub oidc: Option<OidcConfig>,

    /// Pending-login and session storage.
    #[serde(default)]
    pub session: SessionConfig,

    /// Response encoding.
    #[serde(default)]
    pub encoding: Encoding,

    /// Logging.
    #[serde(default)]
    pub logging: LogConfig,
}

impl PortcullisConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - the server address is not a socket address
    /// - the log filter does not parse
    /// - a TTL is zero or two cookies share a name
    /// - the OIDC section lacks an issuer or client id, carries a relative
    ///   URL, or its default return URL is not allow-listed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.logging.enabled {
            portcullis_telemetry::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        self.validate_session()?;

        if let Some(oidc) = &self.oidc {
            let urls = oidc.resolve().map_err(|e| match e {
                OidcError::Config(reason) => ConfigError::invalid_value("oidc", reason),
                other => ConfigError::invalid_value("oidc", other.to_string()),
            })?;
            let allow_list = ReturnAllowList::new(urls.allowed_returns.clone());
            if !allow_list.allows(&urls.default_return) {
                return Err(ConfigError::invalid_value(
                    "oidc.default_return_url",
                    "must be covered by oidc.allowed_return_urls",
                ));
            }
        }

        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        for (field, value) in [
            ("session.state_ttl_secs", session.state_ttl_secs),
            ("session.session_ttl_secs", session.session_ttl_secs),
            ("session.sweep_interval_secs", session.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "must be positive"));
            }
        }

        let names = [
            &session.state_cookie,
            &session.session_cookie,
            &session.csrf_cookie,
        ];
        if names.iter().any(|name| name.is_empty()) {
            return Err(ConfigError::invalid_value(
                "session",
                "cookie names must not be empty",
            ));
        }
        if names.iter().collect::<HashSet<_>>().len() != names.len() {
            return Err(ConfigError::invalid_value(
                "session",
                "state, session and CSRF cookies need distinct names",
            ));
        }
        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty debug logs, indented JSON and local URLs.
    ///
    /// # Example
    ///
    /// ```
    /// use portcullis_config::PortcullisConfig;
    ///
    /// let config = PortcullisConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert!(config.encoding.pretty_json);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                http_addr: "127.0.0.1:8080".to_string(),
                ..ServerConfig::default()
            },
            encoding: Encoding::pretty(),
            logging: LogConfig::development(),
            ..Self::default()
        }
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs at `info` and compact JSON bodies.
    ///
    /// # Example
    ///
    /// ```
    /// use portcullis_config::PortcullisConfig;
    ///
    /// let config = PortcullisConfig::production();
    /// assert_eq!(config.logging.format, portcullis_config::LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        Self {
            encoding: Encoding::compact(),
            logging: LogConfig::production(),
            ..Self::default()
        }
    }
}
