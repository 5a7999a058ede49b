//! Error types for the OIDC flow.

use portcullis_core::Problem;
use thiserror::Error;

/// Errors raised by a [`KeyValueStore`](crate::KeyValueStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Every entry must expire.
    #[error("refusing to store '{key}' without a TTL")]
    MissingTtl {
        /// The rejected key.
        key: String,
    },

    /// The stored value could not be (de)serialized.
    #[error("failed to serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Errors raised while talking to the identity provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// A provider call exceeded its timeout.
    #[error("identity provider request timed out")]
    Timeout,

    /// A transport-level failure.
    #[error("identity provider request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// The token endpoint rejected the code exchange.
    #[error("token endpoint returned {status}")]
    TokenEndpoint {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider error code, if it sent one.
        error: Option<String>,
    },

    /// The token response carried no ID token.
    #[error("token response did not contain an id_token")]
    MissingIdToken,

    /// The ID token header names no signing key.
    #[error("id token header has no key id")]
    MissingKeyId,

    /// No published key matches the token's key id.
    #[error("no signing key with id '{0}'")]
    UnknownKey(String),

    /// Signature or claim validation failed.
    #[error("id token rejected: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}

impl ProviderError {
    /// Whether the failure is the provider refusing the credentials rather
    /// than an infrastructure fault.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::TokenEndpoint { status: 400..=499, .. }
                | Self::MissingKeyId
                | Self::UnknownKey(_)
                | Self::InvalidToken(_)
        )
    }
}

/// Errors raised by the login/callback/logout flow.
#[derive(Error, Debug)]
pub enum OidcError {
    /// The flow configuration is unusable.
    #[error("invalid OIDC configuration: {0}")]
    Config(String),

    /// A URL query parameter could not be parsed.
    #[error("query parameter '{param}' is not a valid URL: {reason}")]
    InvalidUrl {
        /// The offending parameter.
        param: &'static str,
        /// Parser message.
        reason: String,
    },

    /// The query string could not be decoded.
    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    /// The callback arrived without the state cookie.
    #[error("missing auth state cookie")]
    MissingStateCookie,

    /// The callback arrived without a `state` parameter.
    #[error("missing state parameter")]
    MissingState,

    /// The callback arrived without a `code` parameter.
    #[error("missing authorization code")]
    MissingCode,

    /// No pending login matches the state cookie (expired or forged).
    #[error("unknown or expired auth state")]
    UnknownState,

    /// The `state` parameter does not match the pending login.
    #[error("state parameter does not match")]
    StateMismatch,

    /// The callback came from a different client than the login.
    #[error("client origin does not match the login request")]
    OriginMismatch,

    /// The request carries no valid session.
    #[error("no valid session")]
    NoSession,

    /// State or session storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The identity provider failed or refused.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<OidcError> for Problem {
    fn from(e: OidcError) -> Self {
        match e {
            OidcError::InvalidUrl { .. }
            | OidcError::InvalidQuery(_)
            | OidcError::MissingStateCookie
            | OidcError::MissingState
            | OidcError::MissingCode => Problem::bad_request(e.to_string()),
            OidcError::UnknownState
            | OidcError::StateMismatch
            | OidcError::OriginMismatch
            | OidcError::NoSession => Problem::unauthorized(e.to_string()),
            OidcError::Provider(p) if p.is_rejection() => {
                Problem::unauthorized("identity provider rejected the login").with_cause(p)
            }
            OidcError::Provider(p) => Problem::internal_with_cause("identity provider failure", p),
            OidcError::Store(s) => Problem::internal_with_cause("session storage failure", s),
            OidcError::Config(_) => Problem::internal_with_cause("authentication misconfigured", e),
        }
    }
}
