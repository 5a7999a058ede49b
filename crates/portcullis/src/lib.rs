//! # Portcullis
//!
//! Typed routing, a fixed-order security pipeline and OpenID Connect login
//! for hyper services.
//!
//! - Routes are declared against typed [`PathTemplate`]s, so handlers receive
//!   converted path parameters
//! - Every secured route runs CSRF, authentication, identity transformation
//!   and authorization before the handler
//! - `/login`, `/callback` and `/logout` implement the authorization code flow
//!   on top of a TTL'd state and session store
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use portcullis::prelude::*;
//! use portcullis_oidc::InMemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("portcullis.toml")?
//!         .with_dotenv()?
//!         .with_env_prefix("PORTCULLIS")
//!         .load()?;
//!     init_logging(&config.logging)?;
//!
//!     let store = Arc::new(InMemoryStore::new());
//!     store.spawn_sweeper(config.session.sweep_interval());
//!     let flow = Arc::new(http_flow(&config, store)?);
//!
//!     let api = RouteGroup::new().route(
//!         get(PathTemplate::root().lit("me"))
//!             .secured(session_security(&flow))
//!             .no_authorization()
//!             .handle(|call: Call<(), Authenticated, ()>| async move { Json(call.user.user) }),
//!     )?;
//!
//!     let app = App::builder()
//!         .encoding(config.encoding)
//!         .group(auth_routes(flow)?)
//!         .group(api)
//!         .build();
//!     Server::new(app, config.server).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Dispatch
//!
//! ```text
//! Request → RouteGroup 1 ──NotFound/405/Declined──▶ RouteGroup 2 ──▶ ... ──▶ Problem
//!               │
//!               └─ Handled / Committed ──▶ Response
//! ```

#![doc(html_root_url = "https://docs.rs/portcullis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod auth;
mod error;
pub mod route;
mod server;

pub use app::{App, AppBuilder, RouteGroup};
pub use auth::{auth_routes, http_flow, session_security, CALLBACK_PATH, LOGIN_PATH, LOGOUT_PATH};
pub use error::ServerError;
pub use route::{delete, get, patch, post, put, BuiltRoute, Endpoint, Route, RouteBuilder, SecuredRoute};
pub use server::Server;

pub use portcullis_config as config;
pub use portcullis_core as core;
pub use portcullis_middleware as middleware;
pub use portcullis_oidc as oidc;
pub use portcullis_router as router;
pub use portcullis_telemetry as telemetry;

pub use portcullis_router::PathTemplate;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        auth_routes, delete, get, http_flow, patch, post, put, session_security, App, RouteGroup,
        Server,
    };
    pub use portcullis_config::{ConfigLoader, PortcullisConfig};
    pub use portcullis_core::{Json, Problem, Redirect};
    pub use portcullis_middleware::{Authenticated, Call, FnTransformer, SecurityPipeline};
    pub use portcullis_router::{IntParam, PathTemplate, StrParam, UrlParam, UuidParam};
    pub use portcullis_telemetry::init_logging;
}
