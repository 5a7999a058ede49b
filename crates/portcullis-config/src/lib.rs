//! Typed configuration for Portcullis services.
//!
//! This crate loads a [`PortcullisConfig`] with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! - [`ServerConfig`] - listen address, body limit, shutdown timeout
//! - [`OidcConfig`] - identity provider endpoints and credentials
//! - [`SessionConfig`] - state/session TTLs and cookie names
//! - [`Encoding`] - JSON response encoding
//! - [`LogConfig`] - log level and format
//!
//! # Example
//!
//! ```no_run
//! use portcullis_config::ConfigLoader;
//!
//! # fn main() -> Result<(), portcullis_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("portcullis.toml")?
//!     .with_env_prefix("PORTCULLIS")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! max_body_bytes = 2097152
//!
//! [oidc]
//! issuer = "https://tenant.example.com/"
//! client_id = "portcullis"
//! client_secret = "..."
//! default_return_url = "https://app.example.com/"
//! default_callback_url = "https://app.example.com/callback"
//! post_logout_url = "https://app.example.com/"
//! allowed_return_urls = ["https://app.example.com/"]
//!
//! [session]
//! state_ttl_secs = 300
//! session_ttl_secs = 86400
//!
//! [encoding]
//! pretty_json = false
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `PORTCULLIS__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `PORTCULLIS__OIDC__CLIENT_SECRET=...`
//! - `PORTCULLIS__OIDC__ALLOWED_RETURN_URLS=https://a.example.com/,https://b.example.com/`
//! - `PORTCULLIS__LOGGING__FORMAT=pretty`

#![doc(html_root_url = "https://docs.rs/portcullis-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::PortcullisConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::ServerConfig;

pub use portcullis_core::Encoding;
pub use portcullis_oidc::{OidcConfig, SessionConfig};
pub use portcullis_telemetry::{LogConfig, LogFormat};
