//! Pending logins, sessions and the session authenticator.

use crate::config::SessionConfig;
use crate::error::{OidcError, StoreError};
use crate::store::{get_json, put_json, KeyValueStore};
use async_trait::async_trait;
use portcullis_core::{Cookies, OidcUser, Problem, Request};
use portcullis_middleware::{Authenticated, Authenticator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const STATE_PREFIX: &str = "auth-state:";
const SESSION_PREFIX: &str = "session:";

/// A login waiting for the provider's callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// Value the provider must echo back as `state`.
    pub state_token: String,
    /// Where to send the user after login.
    pub return_to_url: Url,
    /// The `redirect_uri` sent to the provider.
    pub callback_url: Url,
    /// First `X-Forwarded-For` hop of the login request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_origin: Option<String>,
}

/// An established session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// The verified user.
    pub identity: OidcUser,
}

/// Namespaced, typed access to the shared store.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    state_ttl: Duration,
    session_ttl: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state_ttl", &self.state_ttl)
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Wraps a store with the configured lifetimes.
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            state_ttl: config.state_ttl(),
            session_ttl: config.session_ttl(),
        }
    }

    /// Lifetime of pending logins.
    #[must_use]
    pub const fn state_ttl(&self) -> Duration {
        self.state_ttl
    }

    /// Lifetime of sessions.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Records a pending login.
    pub async fn put_state(&self, id: &str, state: &AuthState) -> Result<(), StoreError> {
        put_json(&*self.store, &state_key(id), state, self.state_ttl).await
    }

    /// Loads a pending login.
    pub async fn get_state(&self, id: &str) -> Result<Option<AuthState>, StoreError> {
        get_json(&*self.store, &state_key(id)).await
    }

    /// Removes a pending login.
    pub async fn delete_state(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&state_key(id)).await
    }

    /// Records a session.
    pub async fn put_session(&self, id: &str, session: &Session) -> Result<(), StoreError> {
        put_json(&*self.store, &session_key(id), session, self.session_ttl).await
    }

    /// Loads a session.
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        get_json(&*self.store, &session_key(id)).await
    }

    /// Removes a session.
    pub async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&session_key(id)).await
    }
}

fn state_key(id: &str) -> String {
    format!("{STATE_PREFIX}{id}")
}

fn session_key(id: &str) -> String {
    format!("{SESSION_PREFIX}{id}")
}

/// Authenticates requests by their session cookie.
#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    sessions: SessionStore,
    cookie_name: String,
}

impl SessionAuthenticator {
    /// Creates an authenticator reading `cookie_name`.
    pub fn new(sessions: SessionStore, cookie_name: impl Into<String>) -> Self {
        Self {
            sessions,
            cookie_name: cookie_name.into(),
        }
    }

    /// Loads the session a request belongs to.
    pub async fn load(&self, request: &Request) -> Result<Authenticated, OidcError> {
        let cookies = Cookies::from_headers(request.headers());
        let session_id = cookies
            .get_non_empty(&self.cookie_name)
            .ok_or(OidcError::NoSession)?;
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(OidcError::NoSession)?;

        Ok(Authenticated {
            session_id: session_id.to_string(),
            user: session.identity,
        })
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    async fn authenticate(&self, request: &Request) -> Result<Authenticated, Problem> {
        self.load(request).await.map_err(Problem::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use bytes::Bytes;
    use portcullis_core::ProblemKind;

    fn sessions() -> SessionStore {
        SessionStore::new(Arc::new(InMemoryStore::new()), &SessionConfig::default())
    }

    fn request(cookie: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/me");
        if let Some(cookie) = cookie {
            builder = builder.header(http::header::COOKIE, cookie);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_state_and_session_namespaces_are_separate() {
        let store = Arc::new(InMemoryStore::new());
        let sessions = SessionStore::new(store.clone(), &SessionConfig::default());
        let state = AuthState {
            state_token: "tok".into(),
            return_to_url: Url::parse("https://app.example.com/").unwrap(),
            callback_url: Url::parse("https://app.example.com/callback").unwrap(),
            client_origin: None,
        };

        sessions.put_state("id", &state).await.unwrap();
        assert_eq!(sessions.get_state("id").await.unwrap(), Some(state));
        assert!(sessions.get_session("id").await.unwrap().is_none());
        assert!(store.get("auth-state:id").await.unwrap().is_some());

        sessions.delete_state("id").await.unwrap();
        assert!(sessions.get_state("id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authenticator_loads_session() {
        let sessions = sessions();
        let session = Session {
            identity: OidcUser::new("auth0|7").with_email("g@example.com"),
        };
        sessions.put_session("abc", &session).await.unwrap();

        let auth = SessionAuthenticator::new(sessions, "session");
        let identity = auth
            .authenticate(&request(Some("theme=dark; session=abc")))
            .await
            .unwrap();
        assert_eq!(identity.session_id, "abc");
        assert_eq!(identity.user.sub, "auth0|7");
    }

    #[tokio::test]
    async fn test_authenticator_rejects_missing_or_unknown() {
        let auth = SessionAuthenticator::new(sessions(), "session");

        for cookie in [None, Some("session="), Some("session=ghost")] {
            let problem = auth.authenticate(&request(cookie)).await.unwrap_err();
            assert_eq!(problem.kind(), ProblemKind::Unauthorized);
        }
    }
}
