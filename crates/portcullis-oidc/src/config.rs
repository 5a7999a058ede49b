//! Identity provider and session settings.
//!
//! URLs are kept as strings so the settings can be layered from files and
//! environment variables; [`OidcConfig::resolve`] parses them once when the
//! flow is built.

use crate::error::OidcError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Identity provider settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Issuer URL, e.g. `https://tenant.eu.auth0.com/`.
    pub issuer: String,
    /// OAuth client id (also the expected ID token audience).
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// API audience requested at authorization time.
    pub audience: Option<String>,
    /// Requested scopes.
    pub scope: String,
    /// Authorization endpoint override.
    pub authorize_endpoint: Option<String>,
    /// Token endpoint override.
    pub token_endpoint: Option<String>,
    /// Key set endpoint override.
    pub jwks_uri: Option<String>,
    /// Where to send users after login when no `next` is given or allowed.
    pub default_return_url: String,
    /// Callback URL registered with the provider.
    pub default_callback_url: String,
    /// Where to send users after logout.
    pub post_logout_url: String,
    /// Permitted return URL prefixes.
    pub allowed_return_urls: Vec<String>,
    /// Timeout for token exchange and key set fetches.
    pub http_timeout_secs: u64,
    /// How long a fetched key set is trusted.
    pub jwks_ttl_secs: u64,
    /// Clock skew tolerated when checking token expiry.
    pub leeway_secs: u64,
    /// Reject callbacks whose first `X-Forwarded-For` hop differs from the
    /// login request's.
    pub check_forwarded_for: bool,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            audience: None,
            scope: "openid profile email".to_string(),
            authorize_endpoint: None,
            token_endpoint: None,
            jwks_uri: None,
            default_return_url: "http://localhost:8080/".to_string(),
            default_callback_url: "http://localhost:8080/callback".to_string(),
            post_logout_url: "http://localhost:8080/".to_string(),
            allowed_return_urls: vec!["http://localhost:8080/".to_string()],
            http_timeout_secs: 10,
            jwks_ttl_secs: 3600,
            leeway_secs: 60,
            check_forwarded_for: false,
        }
    }
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .field("default_return_url", &self.default_return_url)
            .field("default_callback_url", &self.default_callback_url)
            .field("post_logout_url", &self.post_logout_url)
            .field("allowed_return_urls", &self.allowed_return_urls)
            .field("check_forwarded_for", &self.check_forwarded_for)
            .finish_non_exhaustive()
    }
}

impl OidcConfig {
    /// Creates settings for an issuer and client.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    /// HTTP timeout for provider calls.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Key set cache lifetime.
    #[must_use]
    pub const fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_secs)
    }

    /// Parses and checks every URL.
    pub fn resolve(&self) -> Result<ResolvedUrls, OidcError> {
        if self.client_id.is_empty() {
            return Err(OidcError::Config("client_id is required".into()));
        }
        let issuer = issuer_url(&self.issuer)?;
        let endpoint = |value: &Option<String>, field: &str, default: &str| match value {
            Some(raw) => parse_absolute(field, raw),
            None => issuer
                .join(default)
                .map_err(|e| OidcError::Config(format!("{field}: {e}"))),
        };

        let resolved = ResolvedUrls {
            authorize: endpoint(&self.authorize_endpoint, "authorize_endpoint", "authorize")?,
            token: endpoint(&self.token_endpoint, "token_endpoint", "oauth/token")?,
            jwks: endpoint(&self.jwks_uri, "jwks_uri", ".well-known/jwks.json")?,
            default_return: parse_absolute("default_return_url", &self.default_return_url)?,
            default_callback: parse_absolute("default_callback_url", &self.default_callback_url)?,
            post_logout: parse_absolute("post_logout_url", &self.post_logout_url)?,
            allowed_returns: self
                .allowed_return_urls
                .iter()
                .map(|raw| parse_absolute("allowed_return_urls", raw))
                .collect::<Result<_, _>>()?,
            issuer,
        };
        Ok(resolved)
    }
}

/// The parsed URLs of an [`OidcConfig`].
#[derive(Debug, Clone)]
pub struct ResolvedUrls {
    /// Issuer, always ending in `/`.
    pub issuer: Url,
    /// Authorization endpoint.
    pub authorize: Url,
    /// Token endpoint.
    pub token: Url,
    /// Key set endpoint.
    pub jwks: Url,
    /// Fallback return URL.
    pub default_return: Url,
    /// Fallback callback URL.
    pub default_callback: Url,
    /// Post-logout destination.
    pub post_logout: Url,
    /// Allow-listed return URL prefixes.
    pub allowed_returns: Vec<Url>,
}

fn issuer_url(raw: &str) -> Result<Url, OidcError> {
    if raw.is_empty() {
        return Err(OidcError::Config("issuer is required".into()));
    }
    let mut issuer = parse_absolute("issuer", raw)?;
    if !issuer.path().ends_with('/') {
        let path = format!("{}/", issuer.path());
        issuer.set_path(&path);
    }
    Ok(issuer)
}

fn parse_absolute(field: &str, raw: &str) -> Result<Url, OidcError> {
    let url = Url::parse(raw).map_err(|e| OidcError::Config(format!("{field}: {e}")))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(OidcError::Config(format!("{field}: '{raw}' is not an absolute URL")));
    }
    Ok(url)
}

/// State and session storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of a pending login.
    pub state_ttl_secs: u64,
    /// Lifetime of a session.
    pub session_ttl_secs: u64,
    /// Name of the pending-login cookie.
    pub state_cookie: String,
    /// Name of the session cookie.
    pub session_cookie: String,
    /// Name of the script-readable anti-CSRF cookie.
    pub csrf_cookie: String,
    /// Header that must echo the anti-CSRF cookie.
    pub csrf_header: String,
    /// Interval between sweeps of expired in-memory entries.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: 300,
            session_ttl_secs: 86_400,
            state_cookie: "auth_state".to_string(),
            session_cookie: "session".to_string(),
            csrf_cookie: portcullis_middleware::stages::DEFAULT_CSRF_COOKIE.to_string(),
            csrf_header: portcullis_middleware::stages::DEFAULT_CSRF_HEADER.to_string(),
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Pending-login lifetime.
    #[must_use]
    pub const fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    /// Session lifetime.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Sweep interval for the in-memory store.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
