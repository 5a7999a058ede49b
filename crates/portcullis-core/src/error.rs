//! The problem model.
//!
//! Every failure in routing, the security pipeline or the OIDC flow is
//! expressed as a [`Problem`]. A problem is built once, carries a fresh
//! correlation id (`errorId`), and is rendered at the boundary as an
//! RFC 7807 style document:
//!
//! ```json
//! {
//!   "type": "about:blank",
//!   "title": "Unauthorized",
//!   "status": 401,
//!   "detail": "session expired",
//!   "errorId": "01890a5d-ac96-774b-bcce-b302099a8057"
//! }
//! ```
//!
//! | `ProblemKind` | Status |
//! |---|---|
//! | `BadRequest` | 400 |
//! | `Unauthorized` | 401 |
//! | `Forbidden` | 403 |
//! | `NotFound` | 404 |
//! | `MethodNotAllowed` | 405 |
//! | `InternalServerError` | 500 |

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias using [`Problem`].
pub type ProblemResult<T> = Result<T, Problem>;

/// Classification of a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    /// Malformed path, query or body.
    BadRequest,
    /// Missing or invalid session or identity.
    Unauthorized,
    /// Authorization predicate rejected the caller, or CSRF mismatch.
    Forbidden,
    /// No route matches the path.
    NotFound,
    /// A route matches the path but not the method.
    MethodNotAllowed,
    /// Unexpected fault.
    InternalServerError,
}

impl ProblemKind {
    /// Returns the HTTP status code for this kind.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the default problem title for this kind.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

/// Uniform structured error.
///
/// Problems are immutable once built: the `with_*` methods consume the value
/// and are meant to be chained at the construction site.
///
/// # Example
///
/// ```
/// use portcullis_core::{Problem, ProblemKind};
///
/// let problem = Problem::bad_request("segment 'id' is not a valid UUID")
///     .with_data(serde_json::json!({ "segment": "id" }));
///
/// assert_eq!(problem.kind(), ProblemKind::BadRequest);
/// assert_eq!(problem.status().as_u16(), 400);
/// ```
#[derive(Debug, Error)]
#[error("{} {title}", .kind.status_code().as_u16())]
pub struct Problem {
    kind: ProblemKind,
    title: String,
    detail: Option<String>,
    data: Option<serde_json::Value>,
    error_id: Uuid,
    allowed_methods: Vec<Method>,
    challenge: Option<String>,
    /// The underlying fault (never rendered to clients).
    #[source]
    cause: Option<anyhow::Error>,
}

impl Problem {
    /// Creates a problem of the given kind with its default title.
    #[must_use]
    pub fn new(kind: ProblemKind) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            detail: None,
            data: None,
            error_id: Uuid::now_v7(),
            allowed_methods: Vec::new(),
            challenge: None,
            cause: None,
        }
    }

    /// Creates a Bad Request problem.
    #[must_use]
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::BadRequest).with_detail(detail)
    }

    /// Creates an Unauthorized problem.
    #[must_use]
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Unauthorized).with_detail(detail)
    }

    /// Creates a Forbidden problem.
    #[must_use]
    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Forbidden).with_detail(detail)
    }

    /// Creates a Not Found problem for a path.
    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::new(ProblemKind::NotFound).with_detail(format!("no route matches '{path}'"))
    }

    /// Creates a Method Not Allowed problem.
    ///
    /// The allowed methods are rendered in the `Allow` header and in `data`.
    #[must_use]
    pub fn method_not_allowed(method: &Method, allowed: Vec<Method>) -> Self {
        let names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
        let data = serde_json::json!({ "allowed": names });
        let mut problem = Self::new(ProblemKind::MethodNotAllowed)
            .with_detail(format!("method {method} is not allowed for this route"))
            .with_data(data);
        problem.allowed_methods = allowed;
        problem
    }

    /// Creates an Internal Server Error problem.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::InternalServerError).with_detail(detail)
    }

    /// Creates an Internal Server Error problem with an underlying cause.
    pub fn internal_with_cause(detail: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::internal(detail).with_cause(cause)
    }

    /// Overrides the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the human-readable detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches structured data.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches a `WWW-Authenticate` challenge.
    #[must_use]
    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Returns the problem kind.
    #[must_use]
    pub const fn kind(&self) -> ProblemKind {
        self.kind
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.kind.status_code()
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the detail, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the structured data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    /// Returns the correlation id generated at construction.
    #[must_use]
    pub const fn error_id(&self) -> Uuid {
        self.error_id
    }

    /// Returns the methods permitted for the route (405 only).
    #[must_use]
    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed_methods
    }

    /// Returns the authentication challenge (401 only).
    #[must_use]
    pub fn challenge(&self) -> Option<&str> {
        self.challenge.as_deref()
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    /// Returns true for 5xx problems.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self.kind, ProblemKind::InternalServerError)
    }

    /// Converts this problem to its serializable document.
    #[must_use]
    pub fn to_document(&self) -> ProblemDocument {
        ProblemDocument {
            problem_type: "about:blank".to_string(),
            title: self.title.clone(),
            status: self.status().as_u16(),
            detail: self.detail.clone(),
            data: self.data.clone(),
            error_id: self.error_id.to_string(),
        }
    }
}

/// Serializable problem document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDocument {
    /// Always `about:blank`.
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Short summary.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Correlation id.
    pub error_id: String,
}

/// Field-specific decoding errors, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors {
    /// Map of field path to list of error messages.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates a new empty `FieldErrors`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns `true` if there are no field errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}
