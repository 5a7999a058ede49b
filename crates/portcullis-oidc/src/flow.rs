//! The login, callback and logout handlers.
//!
//! ```text
//! Anonymous --login--> PendingCallback --callback--> Authenticated --logout--> Anonymous
//! ```
//!
//! Every failed callback leaves the user anonymous: no session is written
//! and no return redirect is issued.

use crate::allowlist::ReturnAllowList;
use crate::config::{OidcConfig, ResolvedUrls, SessionConfig};
use crate::error::{OidcError, ProviderError};
use crate::provider::IdentityProvider;
use crate::session::{AuthState, Session, SessionAuthenticator, SessionStore};
use crate::store::KeyValueStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use portcullis_core::{Cookies, Redirect, Request, SameSite, SetCookie};
use portcullis_middleware::stages::constant_time_eq;
use portcullis_middleware::{Authenticated, CsrfGuard};
use rand::RngCore;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use url::Url;

const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Default, Deserialize)]
struct LoginQuery {
    next: Option<String>,
    #[serde(rename = "auth0Callback")]
    callback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CallbackQuery {
    state: Option<String>,
    code: Option<String>,
}

/// Drives the OIDC authorization code flow.
pub struct OidcFlow {
    provider: Arc<dyn IdentityProvider>,
    sessions: SessionStore,
    urls: ResolvedUrls,
    allow_list: ReturnAllowList,
    cookies: SessionConfig,
    check_forwarded_for: bool,
}

impl fmt::Debug for OidcFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcFlow")
            .field("urls", &self.urls)
            .field("sessions", &self.sessions)
            .field("check_forwarded_for", &self.check_forwarded_for)
            .finish_non_exhaustive()
    }
}

impl OidcFlow {
    /// Creates a flow.
    pub fn new(
        config: &OidcConfig,
        session: &SessionConfig,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, OidcError> {
        let urls = config.resolve()?;
        if session.state_ttl_secs == 0 || session.session_ttl_secs == 0 {
            return Err(OidcError::Config("state and session TTLs must be positive".into()));
        }
        Ok(Self {
            provider,
            sessions: SessionStore::new(store, session),
            allow_list: ReturnAllowList::new(urls.allowed_returns.clone()),
            urls,
            cookies: session.clone(),
            check_forwarded_for: config.check_forwarded_for,
        })
    }

    /// Typed access to the state and session entries.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// An authenticator for the session cookie this flow issues.
    #[must_use]
    pub fn authenticator(&self) -> SessionAuthenticator {
        SessionAuthenticator::new(self.sessions.clone(), &self.cookies.session_cookie)
    }

    /// A CSRF guard for the anti-CSRF cookie this flow issues.
    #[must_use]
    pub fn csrf_guard(&self) -> CsrfGuard {
        CsrfGuard::new(&self.cookies.csrf_cookie, &self.cookies.csrf_header)
    }

    /// Starts a login and redirects to the provider.
    pub async fn login(&self, request: &Request) -> Result<Redirect, OidcError> {
        let query: LoginQuery = parse_query(request)?;
        let return_to = match query.next {
            Some(raw) => parse_url("next", &raw)?,
            None => self.urls.default_return.clone(),
        };
        let callback = match query.callback {
            Some(raw) => parse_url("auth0Callback", &raw)?,
            None => self.urls.default_callback.clone(),
        };

        let state_id = random_token();
        let state = AuthState {
            state_token: random_token(),
            return_to_url: return_to,
            callback_url: callback,
            client_origin: forwarded_for(request),
        };
        self.sessions.put_state(&state_id, &state).await?;

        let location = self.provider.authorize_url(&state.state_token, &state.callback_url);
        let state_cookie = cookie(&self.cookies.state_cookie, state_id, is_https(&state.callback_url))
            .http_only(true)
            .max_age(self.sessions.state_ttl());

        tracing::info!(callback = %state.callback_url, "login started");
        Ok(Redirect::to(location.as_str()).with_cookie(state_cookie))
    }

    /// Completes a login.
    pub async fn callback(&self, request: &Request) -> Result<Redirect, OidcError> {
        let cookies = Cookies::from_headers(request.headers());
        let state_id = cookies
            .get_non_empty(&self.cookies.state_cookie)
            .ok_or(OidcError::MissingStateCookie)?;
        let query: CallbackQuery = parse_query(request)?;
        let presented = query.state.ok_or(OidcError::MissingState)?;

        let state = self
            .sessions
            .get_state(state_id)
            .await?
            .ok_or(OidcError::UnknownState)?;
        if !constant_time_eq(presented.as_bytes(), state.state_token.as_bytes()) {
            tracing::warn!("callback state does not match pending login");
            return Err(OidcError::StateMismatch);
        }
        if self.check_forwarded_for {
            if let Some(recorded) = &state.client_origin {
                if forwarded_for(request).as_ref() != Some(recorded) {
                    tracing::warn!("callback origin does not match login origin");
                    return Err(OidcError::OriginMismatch);
                }
            }
        }
        let code = query.code.ok_or(OidcError::MissingCode)?;

        let tokens = self.provider.exchange_code(&code, &state.callback_url).await?;
        let id_token = tokens.id_token.ok_or(ProviderError::MissingIdToken)?;
        let identity = self.provider.verify(&id_token).await?;

        self.sessions.delete_state(state_id).await?;
        let session_id = random_token();
        let user_id = identity.log_id();
        self.sessions
            .put_session(&session_id, &Session { identity })
            .await?;

        let return_to = self
            .allow_list
            .resolve(state.return_to_url, &self.urls.default_return);
        let secure = is_https(&return_to);
        tracing::info!(user = %user_id, "session created");

        let clear_state =
            cleared(&self.cookies.state_cookie, is_https(&state.callback_url)).http_only(true);
        Ok(Redirect::to(return_to.as_str())
            .with_cookie(clear_state)
            .with_cookie(
                cookie(&self.cookies.session_cookie, session_id, secure)
                    .http_only(true)
                    .max_age(self.sessions.session_ttl()),
            )
            .with_cookie(
                cookie(&self.cookies.csrf_cookie, random_token(), secure)
                    .max_age(self.sessions.session_ttl()),
            ))
    }

    /// Ends the session the identity was loaded from.
    pub async fn logout(&self, identity: &Authenticated) -> Result<Redirect, OidcError> {
        self.sessions.delete_session(&identity.session_id).await?;
        tracing::info!(user = %identity.user.log_id(), "session ended");

        let secure = is_https(&self.urls.post_logout);
        Ok(Redirect::to(self.urls.post_logout.as_str())
            .with_cookie(cleared(&self.cookies.session_cookie, secure).http_only(true))
            .with_cookie(cleared(&self.cookies.csrf_cookie, secure)))
    }
}

fn cookie(name: &str, value: String, secure: bool) -> SetCookie {
    SetCookie::new(name, value)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
}

fn cleared(name: &str, secure: bool) -> SetCookie {
    SetCookie::remove(name)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
}

/// 256 bits from the thread-local CSPRNG, URL-safe.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn parse_query<T: serde::de::DeserializeOwned>(request: &Request) -> Result<T, OidcError> {
    serde_urlencoded::from_str(request.uri().query().unwrap_or(""))
        .map_err(|e| OidcError::InvalidQuery(e.to_string()))
}

fn parse_url(param: &'static str, raw: &str) -> Result<Url, OidcError> {
    let url = Url::parse(raw).map_err(|e| OidcError::InvalidUrl {
        param,
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(OidcError::InvalidUrl {
            param,
            reason: "expected an absolute http(s) URL".into(),
        });
    }
    Ok(url)
}

fn forwarded_for(request: &Request) -> Option<String> {
    request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
}

fn is_https(url: &Url) -> bool {
    url.scheme() == "https"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TokenResponse;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use portcullis_core::{OidcUser, Problem, ProblemKind};

    #[derive(Default)]
    struct FakeProvider {
        exchanged_with: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorize_url(&self, state: &str, redirect_uri: &Url) -> Url {
            let mut url = Url::parse("https://idp.example/authorize").unwrap();
            url.query_pairs_mut()
                .append_pair("state", state)
                .append_pair("redirect_uri", redirect_uri.as_str());
            url
        }

        async fn exchange_code(
            &self,
            code: &str,
            redirect_uri: &Url,
        ) -> Result<TokenResponse, ProviderError> {
            self.exchanged_with.lock().push(redirect_uri.to_string());
            if code == "good" {
                Ok(TokenResponse {
                    id_token: Some("id-token".into()),
                    ..TokenResponse::default()
                })
            } else {
                Err(ProviderError::TokenEndpoint {
                    status: 400,
                    error: Some("invalid_grant".into()),
                })
            }
        }

        async fn verify(&self, _id_token: &str) -> Result<OidcUser, ProviderError> {
            Ok(OidcUser::new("auth0|1").with_name("Grace"))
        }
    }

    struct Harness {
        flow: OidcFlow,
        store: Arc<InMemoryStore>,
        provider: Arc<FakeProvider>,
    }

    fn harness(check_forwarded_for: bool) -> Harness {
        let mut config = OidcConfig::new("https://idp.example/", "client", "secret");
        config.default_return_url = "https://app.example/home".into();
        config.default_callback_url = "https://app.example/callback".into();
        config.post_logout_url = "https://app.example/bye".into();
        config.allowed_return_urls = vec!["https://app.example/".into()];
        config.check_forwarded_for = check_forwarded_for;

        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(FakeProvider::default());
        let flow = OidcFlow::new(
            &config,
            &SessionConfig::default(),
            provider.clone(),
            store.clone(),
        )
        .unwrap();
        Harness {
            flow,
            store,
            provider,
        }
    }

    fn get(uri: &str, cookie: Option<&str>, forwarded: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(http::header::COOKIE, cookie);
        }
        if let Some(forwarded) = forwarded {
            builder = builder.header(FORWARDED_FOR, forwarded);
        }
        builder.body(Bytes::new()).unwrap()
    }

    fn find<'a>(redirect: &'a Redirect, name: &str) -> &'a SetCookie {
        redirect
            .cookies()
            .iter()
            .find(|c| c.name() == name)
            .unwrap_or_else(|| panic!("no {name} cookie"))
    }

    /// Runs `/login` and returns (state cookie value, state token).
    async fn login(h: &Harness, query: &str, forwarded: Option<&str>) -> (String, String) {
        let redirect = h
            .flow
            .login(&get(&format!("/login{query}"), None, forwarded))
            .await
            .unwrap();
        let cookie = find(&redirect, "auth_state").value().to_string();
        let location = Url::parse(redirect.location()).unwrap();
        let state = location
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        (cookie, state)
    }

    #[tokio::test]
    async fn test_login_issues_state_cookie_and_redirect() {
        let h = harness(false);
        let redirect = h.flow.login(&get("/login", None, None)).await.unwrap();

        assert!(redirect.location().starts_with("https://idp.example/authorize?"));
        assert!(redirect
            .location()
            .contains("redirect_uri=https%3A%2F%2Fapp.example%2Fcallback"));

        let cookie = find(&redirect, "auth_state");
        assert!(cookie.is_http_only());
        assert!(cookie.is_secure());
        let header = cookie.to_header_value();
        assert!(header.contains("Path=/"));
        assert!(header.contains("SameSite=Lax"));

        let pending = h
            .flow
            .sessions()
            .get_state(cookie.value())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.return_to_url.as_str(), "https://app.example/home");
        assert!(redirect.location().contains(&pending.state_token));
    }

    #[tokio::test]
    async fn test_login_rejects_unparseable_next() {
        let h = harness(false);
        let err = h
            .flow
            .login(&get("/login?next=not%20a%20url", None, None))
            .await
            .unwrap_err();
        assert_eq!(Problem::from(err).kind(), ProblemKind::BadRequest);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_plain_http_callback_gets_insecure_state_cookie() {
        let h = harness(false);
        let redirect = h
            .flow
            .login(&get(
                "/login?auth0Callback=http%3A%2F%2Flocalhost%3A8080%2Fcallback",
                None,
                None,
            ))
            .await
            .unwrap();
        assert!(!find(&redirect, "auth_state").is_secure());
    }

    #[tokio::test]
    async fn test_happy_path() {
        let h = harness(false);
        let (cookie, state) = login(&h, "?next=https%3A%2F%2Fapp.example%2Fdash", None).await;

        let redirect = h
            .flow
            .callback(&get(
                &format!("/callback?state={state}&code=good"),
                Some(&format!("auth_state={cookie}")),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(redirect.location(), "https://app.example/dash");
        assert!(find(&redirect, "auth_state").is_removal());

        let session = find(&redirect, "session");
        assert!(session.is_http_only());
        assert!(session.is_secure());
        let csrf = find(&redirect, "XSRF-TOKEN");
        assert!(!csrf.is_http_only());
        assert!(!csrf.value().is_empty());

        let stored = h
            .flow
            .sessions()
            .get_session(session.value())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.identity.sub, "auth0|1");
        assert!(h.flow.sessions().get_state(&cookie).await.unwrap().is_none());
        assert_eq!(
            h.provider.exchanged_with.lock().as_slice(),
            ["https://app.example/callback".to_string()]
        );
    }

    #[tokio::test]
    async fn test_open_redirect_falls_back_to_default() {
        let h = harness(false);
        let (cookie, state) = login(&h, "?next=https%3A%2F%2Fevil.example%2Fphish", None).await;

        let redirect = h
            .flow
            .callback(&get(
                &format!("/callback?state={state}&code=good"),
                Some(&format!("auth_state={cookie}")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(redirect.location(), "https://app.example/home");
    }

    #[tokio::test]
    async fn test_state_mismatch_creates_no_session() {
        let h = harness(false);
        let (cookie, _) = login(&h, "", None).await;

        let err = h
            .flow
            .callback(&get(
                "/callback?state=forged&code=good",
                Some(&format!("auth_state={cookie}")),
                None,
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, OidcError::StateMismatch));
        assert_eq!(Problem::from(err).kind(), ProblemKind::Unauthorized);
        // Only the pending login remains.
        assert_eq!(h.store.len(), 1);
        assert!(h.provider.exchanged_with.lock().is_empty());
    }

    #[tokio::test]
    async fn test_callback_input_errors() {
        let h = harness(false);
        let (cookie, state) = login(&h, "", None).await;
        let with_cookie = format!("auth_state={cookie}");

        let err = h
            .flow
            .callback(&get(&format!("/callback?state={state}&code=good"), None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::MissingStateCookie));

        let err = h
            .flow
            .callback(&get("/callback?code=good", Some(&with_cookie), None))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::MissingState));

        let err = h
            .flow
            .callback(&get(
                &format!("/callback?state={state}&code=good"),
                Some("auth_state=unknown"),
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::UnknownState));

        let err = h
            .flow
            .callback(&get(&format!("/callback?state={state}"), Some(&with_cookie), None))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::MissingCode));
    }

    #[tokio::test]
    async fn test_failed_exchange_creates_no_session() {
        let h = harness(false);
        let (cookie, state) = login(&h, "", None).await;

        let err = h
            .flow
            .callback(&get(
                &format!("/callback?state={state}&code=bad"),
                Some(&format!("auth_state={cookie}")),
                None,
            ))
            .await
            .unwrap_err();
        assert_eq!(Problem::from(err).kind(), ProblemKind::Unauthorized);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_forwarded_for_check() {
        let h = harness(true);
        let (cookie, state) = login(&h, "", Some("203.0.113.9, 10.0.0.1")).await;
        let uri = format!("/callback?state={state}&code=good");
        let with_cookie = format!("auth_state={cookie}");

        let err = h
            .flow
            .callback(&get(&uri, Some(&with_cookie), Some("198.51.100.7")))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::OriginMismatch));

        let ok = h
            .flow
            .callback(&get(&uri, Some(&with_cookie), Some("203.0.113.9, 10.0.0.2")))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_forwarded_for_ignored_when_disabled() {
        let h = harness(false);
        let (cookie, state) = login(&h, "", Some("203.0.113.9")).await;

        let result = h
            .flow
            .callback(&get(
                &format!("/callback?state={state}&code=good"),
                Some(&format!("auth_state={cookie}")),
                Some("198.51.100.7"),
            ))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_cookies() {
        let h = harness(false);
        let session = Session {
            identity: OidcUser::new("auth0|1"),
        };
        h.flow.sessions().put_session("sid", &session).await.unwrap();

        let identity = h
            .flow
            .authenticator()
            .load(&get("/logout", Some("session=sid"), None))
            .await
            .unwrap();
        let redirect = h.flow.logout(&identity).await.unwrap();

        assert_eq!(redirect.location(), "https://app.example/bye");
        assert!(find(&redirect, "session").is_removal());
        assert!(find(&redirect, "XSRF-TOKEN").is_removal());
        assert!(h.flow.sessions().get_session("sid").await.unwrap().is_none());

        let again = h
            .flow
            .authenticator()
            .load(&get("/logout", Some("session=sid"), None))
            .await;
        assert!(matches!(again, Err(OidcError::NoSession)));
    }

    #[test]
    fn test_random_tokens_are_distinct_and_url_safe() {
        let a = random_token();
        let b = random_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
