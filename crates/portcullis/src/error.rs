//! Server errors.

use portcullis_oidc::OidcError;
use portcullis_router::RouteConflict;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while assembling or running a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address is not a socket address.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// The listener could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// The requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Two routes claim the same method for one template.
    #[error(transparent)]
    Route(#[from] RouteConflict),

    /// The login flow could not be set up.
    #[error(transparent)]
    Oidc(#[from] OidcError),
}
