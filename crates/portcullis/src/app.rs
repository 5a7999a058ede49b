//! Application dispatch.
//!
//! An [`App`] is an ordered list of [`RouteGroup`]s. Each group is an
//! independent registry; groups are tried in order:
//!
//! | Group result | Dispatch |
//! |---|---|
//! | not found / method not allowed | try the next group |
//! | `Declined` (CSRF or authentication) | remember, try the next group |
//! | `Committed` | final |
//! | `Handled` | final |
//!
//! When no group handles the request, the first declined problem wins,
//! then a 405, then a 404.

use crate::route::{BuiltRoute, Endpoint};
use futures_util::FutureExt;
use http::header::HeaderValue;
use portcullis_core::{
    Encoding, IntoResponse, Problem, Request, RequestContext, Response, REQUEST_ID_HEADER,
};
use portcullis_middleware::Outcome;
use portcullis_router::{RouteConflict, RouteError, Router};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// One registry of routes.
///
/// Routes sharing a template merge into one method table; claiming the same
/// method twice, or adding a route an earlier typed route always hides, is a
/// [`RouteConflict`].
#[derive(Default)]
pub struct RouteGroup {
    router: Router<Arc<dyn Endpoint>>,
}

impl RouteGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    pub fn route<P: Send + 'static>(mut self, route: BuiltRoute<P>) -> Result<Self, RouteConflict> {
        self.router
            .register(&route.template, route.method, route.endpoint)?;
        Ok(self)
    }

    /// Merges another group into this one.
    pub fn merge(mut self, other: Self) -> Result<Self, RouteConflict> {
        self.router.merge(other.router)?;
        Ok(self)
    }

    /// Returns the underlying registry.
    #[must_use]
    pub fn router(&self) -> &Router<Arc<dyn Endpoint>> {
        &self.router
    }
}

impl fmt::Debug for RouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RouteGroup").field(&self.router).finish()
    }
}

/// A routed application.
pub struct App {
    groups: Vec<RouteGroup>,
    encoding: Encoding,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("groups", &self.groups)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl App {
    /// Starts building an application.
    #[must_use]
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    /// Returns the output encoding.
    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Handles a request with a fresh context.
    pub async fn call(&self, request: Request) -> Response {
        let context = RequestContext::from_headers(
            request.method().clone(),
            request.uri().path(),
            request.headers(),
        );
        self.dispatch(request, context).await
    }

    /// Handles a request.
    ///
    /// Never fails: every problem, including a panicking handler, is
    /// rendered as a problem response.
    pub async fn dispatch(&self, request: Request, context: RequestContext) -> Response {
        let outcome = AssertUnwindSafe(self.route(request, &context))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Problem::internal_with_cause(
                    "unexpected fault",
                    anyhow::anyhow!("handler panicked: {}", panic_message(panic.as_ref())),
                ))
            });

        let response = match outcome {
            Ok(response) => with_request_id(response, &context),
            Err(problem) => self.reject(problem, &context),
        };

        tracing::debug!(
            request_id = %context.request_id(),
            method = %context.method(),
            path = context.path(),
            status = response.status().as_u16(),
            duration_ms = u64::try_from(context.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
        response
    }

    async fn route(&self, request: Request, context: &RequestContext) -> Result<Response, Problem> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let mut declined: Option<Problem> = None;
        let mut unmatched: Option<RouteError> = None;

        for group in &self.groups {
            let endpoint = match group.router.resolve(&method, &path) {
                Ok(found) => Arc::clone(found.handler),
                Err(RouteError::InvalidParam(err)) => return Err(err.into()),
                Err(err) => {
                    let replace = match (&unmatched, &err) {
                        (None, _) => true,
                        (Some(RouteError::NotFound(_)), RouteError::MethodNotAllowed { .. }) => true,
                        _ => false,
                    };
                    if replace {
                        unmatched = Some(err);
                    }
                    continue;
                }
            };

            match endpoint
                .call(copy_request(&request), context.clone(), self.encoding)
                .await
            {
                Outcome::Handled(response) => return Ok(response),
                Outcome::Committed(problem) => return Err(problem),
                Outcome::Declined(problem) => {
                    tracing::debug!(
                        status = problem.status().as_u16(),
                        "route declined, trying later groups"
                    );
                    declined.get_or_insert(problem);
                }
            }
        }

        Err(declined
            .or_else(|| unmatched.map(Problem::from))
            .unwrap_or_else(|| Problem::not_found(&path)))
    }

    /// Logs and renders a problem.
    pub(crate) fn reject(&self, problem: Problem, context: &RequestContext) -> Response {
        let body = serde_json::to_string(&problem.to_document()).unwrap_or_default();
        if problem.is_server_error() {
            tracing::error!(
                request_id = %context.request_id(),
                error_id = %problem.error_id(),
                status = problem.status().as_u16(),
                cause = ?problem.cause(),
                body = %body,
                "request failed"
            );
        } else {
            tracing::warn!(
                request_id = %context.request_id(),
                error_id = %problem.error_id(),
                status = problem.status().as_u16(),
                body = %body,
                "request rejected"
            );
        }
        with_request_id(problem.into_response(&self.encoding), context)
    }
}

/// Builder for [`App`].
#[derive(Debug, Default)]
pub struct AppBuilder {
    groups: Vec<RouteGroup>,
    encoding: Encoding,
}

impl AppBuilder {
    /// Appends a route group. Earlier groups are tried first.
    #[must_use]
    pub fn group(mut self, group: RouteGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Sets the output encoding.
    #[must_use]
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Finishes the application.
    #[must_use]
    pub fn build(self) -> App {
        tracing::debug!(groups = self.groups.len(), "application built");
        App {
            groups: self.groups,
            encoding: self.encoding,
        }
    }
}

fn with_request_id(mut response: Response, context: &RequestContext) -> Response {
    if let Ok(id) = HeaderValue::from_str(&context.request_id().to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, id);
    }
    response
}

/// Rebuilds a request so each group attempt owns one.
fn copy_request(request: &Request) -> Request {
    let mut copy = http::Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
