//! # Portcullis OIDC
//!
//! OpenID Connect authorization code flow:
//!
//! - [`OidcFlow`] - the `/login`, `/callback` and `/logout` handlers
//! - [`IdentityProvider`] / [`HttpIdentityProvider`] - authorize URL, code
//!   exchange and ID token verification against the provider's key set
//! - [`KeyValueStore`] / [`InMemoryStore`] - TTL'd storage for pending logins
//!   and sessions
//! - [`SessionAuthenticator`] - session cookie authentication for the
//!   security pipeline
//!
//! ## Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryStore::new());
//! let provider = Arc::new(HttpIdentityProvider::new(&oidc)?);
//! let flow = OidcFlow::new(&oidc, &session, provider, store)?;
//!
//! let pipeline = SecurityPipeline::builder(flow.authenticator())
//!     .csrf(flow.csrf_guard())
//!     .build();
//! ```

#![doc(html_root_url = "https://docs.rs/portcullis-oidc/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod allowlist;
pub mod config;
mod error;
mod flow;
pub mod provider;
mod session;
pub mod store;

pub use allowlist::ReturnAllowList;
pub use config::{OidcConfig, ResolvedUrls, SessionConfig};
pub use error::{OidcError, ProviderError, StoreError};
pub use flow::OidcFlow;
pub use provider::{HttpIdentityProvider, IdentityProvider, TokenResponse};
pub use session::{AuthState, Session, SessionAuthenticator, SessionStore};
pub use store::{InMemoryStore, KeyValueStore};
