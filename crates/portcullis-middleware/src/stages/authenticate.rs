//! Authentication (stage 2).
//!
//! An [`Authenticator`] turns request credentials into the raw identity,
//! usually by looking a session cookie up in a session store.

use async_trait::async_trait;
use portcullis_core::{OidcUser, Problem, Request};
use serde::{Deserialize, Serialize};

/// Default realm used in `WWW-Authenticate` challenges.
pub const DEFAULT_REALM: &str = "portcullis";

/// The raw identity produced by authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authenticated {
    /// The session the identity was loaded from.
    pub session_id: String,
    /// The decoded OIDC user.
    pub user: OidcUser,
}

/// Extracts the raw identity from a request.
///
/// Implementations return an Unauthorized problem when credentials are
/// missing or invalid; the pipeline attaches the challenge.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Authenticates the request.
    async fn authenticate(&self, request: &Request) -> Result<Authenticated, Problem>;
}

/// Renders the challenge for a realm.
#[must_use]
pub fn challenge(realm: &str) -> String {
    format!("Cookie realm=\"{realm}\"")
}
