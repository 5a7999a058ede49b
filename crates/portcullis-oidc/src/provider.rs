//! Identity provider client.
//!
//! [`HttpIdentityProvider`] talks to an OAuth 2.0 / OpenID Connect provider:
//!
//! - builds the authorization URL users are redirected to
//! - exchanges the authorization code at the token endpoint
//! - verifies the returned ID token against the provider's published keys

use crate::config::{OidcConfig, ResolvedUrls};
use crate::error::{OidcError, ProviderError};
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use portcullis_core::OidcUser;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

/// Successful token endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    /// Access token for the requested audience.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Signed identity token.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Token type, usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
}

/// The operations the login flow needs from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Builds the URL that starts an interactive login.
    fn authorize_url(&self, state: &str, redirect_uri: &Url) -> Url;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &Url,
    ) -> Result<TokenResponse, ProviderError>;

    /// Verifies an ID token and decodes its user.
    async fn verify(&self, id_token: &str) -> Result<OidcUser, ProviderError>;
}

struct CachedKeys {
    keys: JwkSet,
    /// `None` for pinned keys, which never expire.
    fetched_at: Option<Instant>,
}

/// HTTP client for a standards-compliant provider.
pub struct HttpIdentityProvider {
    urls: ResolvedUrls,
    client_id: String,
    client_secret: String,
    audience: Option<String>,
    scope: String,
    leeway: u64,
    jwks_ttl: Duration,
    http: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
}

impl fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("issuer", &self.urls.issuer.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl HttpIdentityProvider {
    /// Creates a client from provider settings.
    pub fn new(config: &OidcConfig) -> Result<Self, OidcError> {
        let urls = config.resolve()?;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(ProviderError::Client)?;

        Ok(Self {
            urls,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            audience: config.audience.clone(),
            scope: config.scope.clone(),
            leeway: config.leeway_secs,
            jwks_ttl: config.jwks_ttl(),
            http,
            keys: RwLock::new(None),
        })
    }

    /// Pins the verification keys instead of fetching them.
    #[must_use]
    pub fn with_static_keys(self, keys: JwkSet) -> Self {
        *self.keys.write() = Some(CachedKeys {
            keys,
            fetched_at: None,
        });
        self
    }

    /// The issuer tokens must carry.
    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.urls.issuer
    }

    fn cached_key(&self, kid: &str) -> (Option<Jwk>, bool) {
        let guard = self.keys.read();
        match guard.as_ref() {
            Some(cached) => {
                let fresh = cached
                    .fetched_at
                    .map_or(true, |at| at.elapsed() < self.jwks_ttl);
                let pinned = cached.fetched_at.is_none();
                (cached.keys.find(kid).cloned().filter(|_| fresh), pinned)
            }
            None => (None, false),
        }
    }

    async fn fetch_keys(&self) -> Result<(), ProviderError> {
        tracing::debug!(url = %self.urls.jwks, "fetching provider key set");
        let keys: JwkSet = self
            .http
            .get(self.urls.jwks.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        *self.keys.write() = Some(CachedKeys {
            keys,
            fetched_at: Some(Instant::now()),
        });
        Ok(())
    }

    /// Finds a signing key, refetching once when the cache is stale or the
    /// key id is unknown.
    async fn signing_key(&self, kid: &str) -> Result<Jwk, ProviderError> {
        let (key, pinned) = self.cached_key(kid);
        if let Some(key) = key {
            return Ok(key);
        }
        if pinned {
            return Err(ProviderError::UnknownKey(kid.to_string()));
        }

        self.fetch_keys().await?;
        self.cached_key(kid)
            .0
            .ok_or_else(|| ProviderError::UnknownKey(kid.to_string()))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.urls.issuer.as_str()]);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.leeway;
        validation
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn authorize_url(&self, state: &str, redirect_uri: &Url) -> Url {
        let mut url = self.urls.authorize.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("scope", &self.scope)
                .append_pair("state", state);
            if let Some(audience) = &self.audience {
                query.append_pair("audience", audience);
            }
        }
        url
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &Url,
    ) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http
            .post(self.urls.token.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error = response
                .json::<TokenErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error);
            tracing::warn!(status = status.as_u16(), error = ?error, "token exchange rejected");
            return Err(ProviderError::TokenEndpoint {
                status: status.as_u16(),
                error,
            });
        }

        Ok(response.json().await?)
    }

    async fn verify(&self, id_token: &str) -> Result<OidcUser, ProviderError> {
        let header = decode_header(id_token)?;
        let kid = header.kid.ok_or(ProviderError::MissingKeyId)?;
        let jwk = self.signing_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)?;

        let data = decode::<OidcUser>(id_token, &key, &self.validation())?;
        Ok(data.claims)
    }
}
