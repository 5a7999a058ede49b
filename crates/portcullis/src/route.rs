//! Route declaration.
//!
//! A route is declared in the order the security pipeline runs:
//!
//! ```text
//! get(template) ─┬─ unsecured() ─────────────────────────────┬─ [json_body::<B>()] ─ handle(f)
//!                └─ secured(pipeline) ─┬─ authorize(pred) ───┤
//!                                      └─ no_authorization() ┘
//! ```
//!
//! A secured route must state its authorization policy before it can take a
//! handler. The finished [`BuiltRoute`] owns its typed template, so the
//! handler receives typed path parameters without any runtime downcast.

use http::Method;
use portcullis_core::{Encoding, Problem, Request, RequestContext};
use portcullis_middleware::{
    Authorization, BoxFuture, Decode, Guard, Handler, JsonBody, NoBody, Outcome, Pipeline,
    SecurityPipeline, Unsecured,
};
use portcullis_router::{CaptureError, PathTemplate};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// A type-erased route endpoint stored in the registry.
pub trait Endpoint: Send + Sync + 'static {
    /// Captures the path parameters and runs the route's pipeline.
    fn call(
        &self,
        request: Request,
        context: RequestContext,
        encoding: Encoding,
    ) -> BoxFuture<'_, Outcome>;
}

struct TypedEndpoint<P, U, B> {
    template: PathTemplate<P>,
    pipeline: Pipeline<P, U, B>,
}

impl<P, U, B> Endpoint for TypedEndpoint<P, U, B>
where
    P: Send + Sync + 'static,
    U: Send + Sync + 'static,
    B: Send + 'static,
{
    fn call(
        &self,
        request: Request,
        context: RequestContext,
        encoding: Encoding,
    ) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            let params = match self.template.capture(request.uri().path()) {
                Ok(params) => params,
                Err(CaptureError::Param(err)) => return Outcome::Committed(err.into()),
                Err(CaptureError::Mismatch) => {
                    return Outcome::Committed(Problem::internal(
                        "resolved route does not match the request path",
                    ))
                }
            };
            self.pipeline.run(request, context, params, encoding).await
        })
    }
}

/// A route with a method and template, awaiting its security choice.
pub struct Route<P> {
    method: Method,
    template: PathTemplate<P>,
}

impl<P: Send + Sync + 'static> Route<P> {
    /// Starts a route for any method.
    pub fn new(method: Method, template: PathTemplate<P>) -> Self {
        Self { method, template }
    }

    /// Skips CSRF, authentication and authorization.
    pub fn unsecured(self) -> RouteBuilder<P, (), ()> {
        RouteBuilder {
            method: self.method,
            template: self.template,
            guard: Arc::new(Unsecured),
            authorization: Authorization::none(),
            decoder: Arc::new(NoBody),
        }
    }

    /// Runs the security pipeline before the handler.
    pub fn secured<U: Send + Sync + 'static>(
        self,
        security: SecurityPipeline<U>,
    ) -> SecuredRoute<P, U> {
        SecuredRoute {
            method: self.method,
            template: self.template,
            guard: Arc::new(security),
        }
    }
}

/// Starts a `GET` route.
pub fn get<P: Send + Sync + 'static>(template: PathTemplate<P>) -> Route<P> {
    Route::new(Method::GET, template)
}

/// Starts a `POST` route.
pub fn post<P: Send + Sync + 'static>(template: PathTemplate<P>) -> Route<P> {
    Route::new(Method::POST, template)
}

/// Starts a `PUT` route.
pub fn put<P: Send + Sync + 'static>(template: PathTemplate<P>) -> Route<P> {
    Route::new(Method::PUT, template)
}

/// Starts a `DELETE` route.
pub fn delete<P: Send + Sync + 'static>(template: PathTemplate<P>) -> Route<P> {
    Route::new(Method::DELETE, template)
}

/// Starts a `PATCH` route.
pub fn patch<P: Send + Sync + 'static>(template: PathTemplate<P>) -> Route<P> {
    Route::new(Method::PATCH, template)
}

/// A secured route that has not chosen an authorization policy yet.
pub struct SecuredRoute<P, U> {
    method: Method,
    template: PathTemplate<P>,
    guard: Arc<dyn Guard<U>>,
}

impl<P, U> SecuredRoute<P, U>
where
    P: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    /// Allows the request only when `predicate` holds for the user and the
    /// typed path parameters.
    pub fn authorize<F>(self, predicate: F) -> RouteBuilder<P, U, ()>
    where
        F: Fn(&U, &P) -> bool + Send + Sync + 'static,
    {
        self.with(Authorization::require(predicate))
    }

    /// Any authenticated user may call the route.
    pub fn no_authorization(self) -> RouteBuilder<P, U, ()> {
        self.with(Authorization::none())
    }

    fn with(self, authorization: Authorization<U, P>) -> RouteBuilder<P, U, ()> {
        RouteBuilder {
            method: self.method,
            template: self.template,
            guard: self.guard,
            authorization,
            decoder: Arc::new(NoBody),
        }
    }
}

/// A route ready for an optional payload type and its handler.
pub struct RouteBuilder<P, U, B> {
    method: Method,
    template: PathTemplate<P>,
    guard: Arc<dyn Guard<U>>,
    authorization: Authorization<U, P>,
    decoder: Arc<dyn Decode<B>>,
}

impl<P, U, B> RouteBuilder<P, U, B>
where
    P: Send + Sync + 'static,
    U: Send + Sync + 'static,
    B: Send + 'static,
{
    /// Declares a JSON payload, decoded after authorization.
    pub fn json_body<T: DeserializeOwned + Send + 'static>(self) -> RouteBuilder<P, U, T> {
        RouteBuilder {
            method: self.method,
            template: self.template,
            guard: self.guard,
            authorization: self.authorization,
            decoder: Arc::new(JsonBody::<T>::new()),
        }
    }

    /// Attaches the handler.
    pub fn handle<H: Handler<P, U, B>>(self, handler: H) -> BuiltRoute<P> {
        let pipeline = Pipeline::new(
            self.guard,
            self.authorization,
            self.decoder,
            Arc::new(handler),
        );
        BuiltRoute {
            method: self.method,
            template: self.template.clone(),
            endpoint: Arc::new(TypedEndpoint {
                template: self.template,
                pipeline,
            }),
        }
    }
}

/// A complete route, ready to be added to a
/// [`RouteGroup`](crate::RouteGroup).
pub struct BuiltRoute<P> {
    pub(crate) method: Method,
    pub(crate) template: PathTemplate<P>,
    pub(crate) endpoint: Arc<dyn Endpoint>,
}

impl<P> BuiltRoute<P> {
    /// Returns the route method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the route template.
    #[must_use]
    pub fn template(&self) -> &PathTemplate<P> {
        &self.template
    }
}

impl<P> fmt::Debug for BuiltRoute<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}
