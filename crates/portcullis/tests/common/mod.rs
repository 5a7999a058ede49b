//! Shared harness: an application with the login routes, one protected
//! route, an in-memory store and a scripted identity provider.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use portcullis::prelude::*;
use portcullis::oidc::{
    IdentityProvider, InMemoryStore, OidcConfig, OidcFlow, ProviderError, SessionConfig,
    TokenResponse,
};
use portcullis::core::{OidcUser, Response};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Accepts the code `good`; every other code is rejected by the token
/// endpoint.
#[derive(Default)]
pub struct ScriptedProvider {
    pub redirects: Mutex<Vec<String>>,
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
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
        self.redirects.lock().push(redirect_uri.to_string());
        if code == "good" {
            Ok(TokenResponse {
                id_token: Some("signed".into()),
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
        Ok(OidcUser::new("auth0|ada").with_email("ada@app.example"))
    }
}

pub struct TestApp {
    pub app: App,
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<ScriptedProvider>,
}

pub fn oidc_config() -> OidcConfig {
    let mut config = OidcConfig::new("https://idp.example/", "client", "secret");
    config.default_return_url = "https://app.example/home".into();
    config.default_callback_url = "https://app.example/callback".into();
    config.post_logout_url = "https://app.example/bye".into();
    config.allowed_return_urls = vec!["https://app.example/".into()];
    config
}

pub fn test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(ScriptedProvider::default());
    let flow = Arc::new(
        OidcFlow::new(
            &oidc_config(),
            &SessionConfig::default(),
            provider.clone(),
            store.clone(),
        )
        .unwrap(),
    );

    let api = RouteGroup::new()
        .route(
            get(PathTemplate::root().lit("me"))
                .secured(session_security(&flow))
                .no_authorization()
                .handle(|call: Call<(), Authenticated, ()>| async move { Json(call.user.user) }),
        )
        .unwrap();

    let app = App::builder()
        .group(auth_routes(flow).unwrap())
        .group(api)
        .build();
    TestApp {
        app,
        store,
        provider,
    }
}

pub fn request(method: Method, uri: &str, cookies: &[(&str, &str)]) -> http::Request<Bytes> {
    let mut builder = http::Request::builder().method(method).uri(uri);
    if !cookies.is_empty() {
        let header = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(header::COOKIE, header);
    }
    builder.body(Bytes::new()).unwrap()
}

pub fn location(response: &Response) -> Url {
    assert_eq!(response.status(), StatusCode::FOUND);
    Url::parse(response.headers()[header::LOCATION].to_str().unwrap()).unwrap()
}

/// `Set-Cookie` name to full header value.
pub fn set_cookies(response: &Response) -> HashMap<String, String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| {
            let value = v.to_str().unwrap().to_string();
            let name = value.split('=').next().unwrap().to_string();
            (name, value)
        })
        .collect()
}

/// The value part of a `Set-Cookie` header.
pub fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, v)| v.to_string())
        .unwrap()
}

pub fn query_param(url: &Url, name: &str) -> String {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A finished login: the session and CSRF cookie values.
pub struct LoggedIn {
    pub session: String,
    pub csrf: String,
    pub return_to: Url,
}

/// Runs `/login?next=...` and `/callback` with the code `good`.
pub async fn log_in(app: &App, next: &str) -> LoggedIn {
    let login = app
        .call(request(
            Method::GET,
            &format!("/login?next={}", urlencode(next)),
            &[],
        ))
        .await;
    let authorize = location(&login);
    let state = query_param(&authorize, "state");
    let state_cookie = cookie_value(&set_cookies(&login)["auth_state"]);

    let callback = app
        .call(request(
            Method::GET,
            &format!("/callback?state={state}&code=good"),
            &[("auth_state", &state_cookie)],
        ))
        .await;
    let return_to = location(&callback);
    let cookies = set_cookies(&callback);
    LoggedIn {
        session: cookie_value(&cookies["session"]),
        csrf: cookie_value(&cookies["XSRF-TOKEN"]),
        return_to,
    }
}

pub fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
