//! The login routes.
//!
//! | Route | Security | Flow step |
//! |---|---|---|
//! | `GET /login` | unsecured | [`OidcFlow::login`] |
//! | `GET /callback` | unsecured | [`OidcFlow::callback`] |
//! | `POST /logout` | session + CSRF, no authorization | [`OidcFlow::logout`] |

use crate::app::RouteGroup;
use crate::error::ServerError;
use crate::route::{get, post};
use portcullis_config::PortcullisConfig;
use portcullis_core::Problem;
use portcullis_middleware::{Authenticated, Call, SecurityPipeline};
use portcullis_oidc::{HttpIdentityProvider, KeyValueStore, OidcError, OidcFlow};
use portcullis_router::{PathTemplate, RouteConflict};
use std::sync::Arc;

/// Path of the login route.
pub const LOGIN_PATH: &str = "/login";
/// Path of the provider callback route.
pub const CALLBACK_PATH: &str = "/callback";
/// Path of the logout route.
pub const LOGOUT_PATH: &str = "/logout";

/// The security pipeline for routes behind the flow's session cookie.
#[must_use]
pub fn session_security(flow: &OidcFlow) -> SecurityPipeline<Authenticated> {
    SecurityPipeline::builder(flow.authenticator())
        .csrf(flow.csrf_guard())
        .build()
}

/// Builds the login, callback and logout routes.
pub fn auth_routes(flow: Arc<OidcFlow>) -> Result<RouteGroup, RouteConflict> {
    let login = {
        let flow = Arc::clone(&flow);
        get(PathTemplate::root().lit(LOGIN_PATH))
            .unsecured()
            .handle(move |call: Call<(), (), ()>| {
                let flow = Arc::clone(&flow);
                async move { flow.login(&call.request).await.map_err(Problem::from) }
            })
    };

    let callback = {
        let flow = Arc::clone(&flow);
        get(PathTemplate::root().lit(CALLBACK_PATH))
            .unsecured()
            .handle(move |call: Call<(), (), ()>| {
                let flow = Arc::clone(&flow);
                async move { flow.callback(&call.request).await.map_err(Problem::from) }
            })
    };

    let logout = post(PathTemplate::root().lit(LOGOUT_PATH))
        .secured(session_security(&flow))
        .no_authorization()
        .handle(move |call: Call<(), Authenticated, ()>| {
            let flow = Arc::clone(&flow);
            async move { flow.logout(&call.user).await.map_err(Problem::from) }
        });

    RouteGroup::new().route(login)?.route(callback)?.route(logout)
}

/// Builds a flow against the configured provider.
///
/// Fails when the configuration has no `[oidc]` section.
pub fn http_flow(
    config: &PortcullisConfig,
    store: Arc<dyn KeyValueStore>,
) -> Result<OidcFlow, ServerError> {
    let oidc = config
        .oidc
        .as_ref()
        .ok_or_else(|| OidcError::Config("no [oidc] section configured".into()))?;
    let provider = Arc::new(HttpIdentityProvider::new(oidc)?);
    Ok(OidcFlow::new(oidc, &config.session, provider, store)?)
}
