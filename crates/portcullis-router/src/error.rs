//! Router errors and their mapping onto problems.

use http::Method;
use portcullis_core::Problem;
use thiserror::Error;

/// A typed segment rejected its token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path segment '{segment}': {message}")]
pub struct ParamError {
    /// Name of the failing segment.
    pub segment: String,
    /// The raw token from the path.
    pub token: String,
    /// The converter's message.
    pub message: String,
}

impl ParamError {
    /// Creates a new parameter error.
    pub fn new(
        segment: impl Into<String>,
        token: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            segment: segment.into(),
            token: token.into(),
            message: message.into(),
        }
    }
}

/// A pattern string could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Placeholders must be declared with a typed converter.
    #[error("pattern '{0}' contains a placeholder; declare typed segments with `param`")]
    Placeholder(String),
}

/// A registration that would make routing ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteConflict {
    /// Two registrations claim the same method for one route key.
    #[error("route {route} already has a handler for {method}")]
    DuplicateMethod {
        /// The route key, rendered.
        route: String,
        /// The contested method.
        method: Method,
    },

    /// A route is visited after a typed route matching every one of its
    /// paths, so it could never be selected.
    #[error("route {route} is unreachable behind {shadowed_by}")]
    Shadowed {
        /// The unreachable route key, rendered.
        route: String,
        /// The route key visited first.
        shadowed_by: String,
    },
}

/// Why a request could not be resolved to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No template matches the path structurally.
    #[error("no route matches '{0}'")]
    NotFound(String),

    /// A template matches but has no handler for the method.
    #[error("method {method} not allowed")]
    MethodNotAllowed {
        /// The request method.
        method: Method,
        /// Registered methods, sorted by name.
        allowed: Vec<Method>,
    },

    /// The matching template rejected a typed segment.
    #[error(transparent)]
    InvalidParam(#[from] ParamError),
}

impl From<ParamError> for Problem {
    fn from(err: ParamError) -> Self {
        let data = serde_json::json!({
            "segment": err.segment,
            "message": err.message,
        });
        Problem::bad_request(err.to_string()).with_data(data)
    }
}

impl From<RouteError> for Problem {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NotFound(path) => Problem::not_found(&path),
            RouteError::MethodNotAllowed { method, allowed } => {
                Problem::method_not_allowed(&method, allowed)
            }
            RouteError::InvalidParam(param) => param.into(),
        }
    }
}
