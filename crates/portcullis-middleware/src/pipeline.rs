//! The fixed-order security pipeline.
//!
//! ```text
//! Request → Csrf → Authenticate → TransformIdentity → Authorize → DecodeBody → Handler → EncodeResponse
//!           └──── Declined ────┘  └──────────────────────── Committed ─────────────────────┘
//! ```
//!
//! The order is fixed. Each stage feeds its output into the next one or
//! short-circuits with a [`Problem`]. Failures in the first two stages are
//! *declined*: another route group may still answer the request. From
//! identity transformation onward, failures are *committed* and end the
//! dispatch.

use crate::handler::{Call, Handler};
use crate::stages::{
    challenge, Authenticated, Authenticator, Authorization, CsrfGuard, Decode, IdentityTransformer,
    PassThrough, DEFAULT_REALM,
};
use async_trait::async_trait;
use portcullis_core::{Encoding, Problem, ProblemKind, Request, RequestContext, Response};
use std::fmt;
use std::sync::Arc;

/// Pipeline stages.
///
/// The pipeline order is fixed:
///
/// 1. CSRF check
/// 2. Authenticate
/// 3. Transform identity
/// 4. Authorize
/// 5. Decode body
/// 6. Handler
/// 7. Encode response
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: double-submit CSRF check
    Csrf = 1,
    /// Stage 2: session lookup
    Authenticate = 2,
    /// Stage 3: map the raw identity to the handler's user type
    TransformIdentity = 3,
    /// Stage 4: route predicate
    Authorize = 4,
    /// Stage 5: payload decoding
    DecodeBody = 5,
    /// Stage 6: handler invocation
    Handler = 6,
    /// Stage 7: output encoding
    EncodeResponse = 7,
}

impl Stage {
    /// Returns true if a failure at this stage is committed.
    #[must_use]
    pub const fn commits(self) -> bool {
        (self as u8) >= 3
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Csrf => "csrf",
            Self::Authenticate => "authenticate",
            Self::TransformIdentity => "transform_identity",
            Self::Authorize => "authorize",
            Self::DecodeBody => "decode_body",
            Self::Handler => "handler",
            Self::EncodeResponse => "encode_response",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 7] {
        [
            Self::Csrf,
            Self::Authenticate,
            Self::TransformIdentity,
            Self::Authorize,
            Self::DecodeBody,
            Self::Handler,
            Self::EncodeResponse,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage short-circuited the pipeline.
#[derive(Debug)]
pub struct StageFailure {
    /// The failing stage.
    pub stage: Stage,
    /// The problem to render.
    pub problem: Problem,
}

impl StageFailure {
    /// Creates a failure.
    #[must_use]
    pub const fn new(stage: Stage, problem: Problem) -> Self {
        Self { stage, problem }
    }

    /// Returns true if no alternative route may override this failure.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.stage.commits()
    }
}

/// The result of running one route.
#[derive(Debug)]
pub enum Outcome {
    /// The handler produced a response.
    Handled(Response),
    /// Rejected before identity transformation; a later route group may
    /// still answer.
    Declined(Problem),
    /// Rejected from identity transformation onward; final.
    Committed(Problem),
}

impl Outcome {
    /// Returns true unless the outcome is `Declined`.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        !matches!(self, Self::Declined(_))
    }
}

impl From<StageFailure> for Outcome {
    fn from(failure: StageFailure) -> Self {
        if failure.is_committed() {
            Self::Committed(failure.problem)
        } else {
            Self::Declined(failure.problem)
        }
    }
}

/// Stages 1-3: produces the handler's user or fails.
#[async_trait]
pub trait Guard<U>: Send + Sync + 'static {
    /// Runs the guarding stages.
    async fn enter(&self, request: &Request) -> Result<U, StageFailure>;
}

/// The guard of unsecured routes: skips stages 1-4.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsecured;

#[async_trait]
impl Guard<()> for Unsecured {
    async fn enter(&self, _request: &Request) -> Result<(), StageFailure> {
        Ok(())
    }
}

/// CSRF check, authentication and identity transformation.
///
/// # Example
///
/// ```ignore
/// let pipeline = SecurityPipeline::builder(SessionAuthenticator::new(store))
///     .csrf(CsrfGuard::default())
///     .transform(FnTransformer::new(|id: Authenticated| load_user(&id)));
/// ```
pub struct SecurityPipeline<U> {
    csrf: CsrfGuard,
    authenticator: Arc<dyn Authenticator>,
    transformer: Arc<dyn IdentityTransformer<U>>,
    realm: String,
}

impl<U> Clone for SecurityPipeline<U> {
    fn clone(&self) -> Self {
        Self {
            csrf: self.csrf.clone(),
            authenticator: Arc::clone(&self.authenticator),
            transformer: Arc::clone(&self.transformer),
            realm: self.realm.clone(),
        }
    }
}

impl<U> fmt::Debug for SecurityPipeline<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityPipeline")
            .field("csrf", &self.csrf)
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

impl SecurityPipeline<Authenticated> {
    /// Starts building a pipeline around an authenticator.
    pub fn builder<A: Authenticator>(authenticator: A) -> SecurityPipelineBuilder {
        SecurityPipelineBuilder {
            csrf: CsrfGuard::default(),
            authenticator: Arc::new(authenticator),
            realm: DEFAULT_REALM.to_string(),
        }
    }
}

impl<U: Send + 'static> SecurityPipeline<U> {
    /// Returns the CSRF guard.
    #[must_use]
    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    async fn run_stages(&self, request: &Request) -> Result<U, StageFailure> {
        self.csrf
            .check(request)
            .map_err(|p| StageFailure::new(Stage::Csrf, p))?;

        let identity = self.authenticator.authenticate(request).await.map_err(|p| {
            let p = if p.kind() == ProblemKind::Unauthorized && p.challenge().is_none() {
                p.with_challenge(challenge(&self.realm))
            } else {
                p
            };
            StageFailure::new(Stage::Authenticate, p)
        })?;

        self.transformer
            .transform(identity)
            .await
            .map_err(|p| StageFailure::new(Stage::TransformIdentity, p))
    }
}

#[async_trait]
impl<U: Send + 'static> Guard<U> for SecurityPipeline<U> {
    async fn enter(&self, request: &Request) -> Result<U, StageFailure> {
        let result = self.run_stages(request).await;
        if let Err(failure) = &result {
            tracing::debug!(
                stage = %failure.stage,
                status = failure.problem.status().as_u16(),
                committed = failure.is_committed(),
                "security pipeline rejected request"
            );
        }
        result
    }
}

/// Builder for [`SecurityPipeline`].
pub struct SecurityPipelineBuilder {
    csrf: CsrfGuard,
    authenticator: Arc<dyn Authenticator>,
    realm: String,
}

impl SecurityPipelineBuilder {
    /// Sets the CSRF guard.
    #[must_use]
    pub fn csrf(mut self, csrf: CsrfGuard) -> Self {
        self.csrf = csrf;
        self
    }

    /// Sets the challenge realm.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Hands the raw identity to handlers unchanged.
    #[must_use]
    pub fn build(self) -> SecurityPipeline<Authenticated> {
        self.transform(PassThrough)
    }

    /// Maps the raw identity with a transformer.
    pub fn transform<U, T: IdentityTransformer<U>>(self, transformer: T) -> SecurityPipeline<U> {
        SecurityPipeline {
            csrf: self.csrf,
            authenticator: self.authenticator,
            transformer: Arc::new(transformer),
            realm: self.realm,
        }
    }
}

/// The full typed chain of one route.
pub struct Pipeline<P, U, B> {
    guard: Arc<dyn Guard<U>>,
    authorization: Authorization<U, P>,
    decoder: Arc<dyn Decode<B>>,
    handler: Arc<dyn Handler<P, U, B>>,
}

impl<P, U, B> Pipeline<P, U, B>
where
    P: Send + Sync + 'static,
    U: Send + Sync + 'static,
    B: Send + 'static,
{
    /// Assembles a chain.
    pub fn new(
        guard: Arc<dyn Guard<U>>,
        authorization: Authorization<U, P>,
        decoder: Arc<dyn Decode<B>>,
        handler: Arc<dyn Handler<P, U, B>>,
    ) -> Self {
        Self {
            guard,
            authorization,
            decoder,
            handler,
        }
    }

    /// Runs every stage in order.
    pub async fn run(
        &self,
        request: Request,
        context: RequestContext,
        params: P,
        encoding: Encoding,
    ) -> Outcome {
        let user = match self.guard.enter(&request).await {
            Ok(user) => user,
            Err(failure) => return failure.into(),
        };

        if let Err(p) = self.authorization.check(&user, &params) {
            return StageFailure::new(Stage::Authorize, p).into();
        }

        let body = match self.decoder.decode(&request) {
            Ok(body) => body,
            Err(p) => return StageFailure::new(Stage::DecodeBody, p).into(),
        };

        let call = Call {
            params,
            user,
            body,
            request,
            context,
        };
        match self.handler.call(call, encoding).await {
            Ok(response) => Outcome::Handled(response),
            Err(failure) => failure.into(),
        }
    }
}

impl<P, U, B> fmt::Debug for Pipeline<P, U, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("authorization", &self.authorization)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{FnTransformer, JsonBody, NoBody};
    use bytes::Bytes;
    use http::{header, Method, StatusCode};
    use portcullis_core::{Json, OidcUser};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts `session=valid`.
    struct CookieAuth {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Authenticator for CookieAuth {
        async fn authenticate(&self, request: &Request) -> Result<Authenticated, Problem> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let cookies = portcullis_core::Cookies::from_headers(request.headers());
            match cookies.get("session") {
                Some("valid") => Ok(Authenticated {
                    session_id: "valid".into(),
                    user: OidcUser::new("auth0|alice"),
                }),
                _ => Err(Problem::unauthorized("no session")),
            }
        }
    }

    fn security() -> (SecurityPipeline<Authenticated>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = SecurityPipeline::builder(CookieAuth {
            calls: Arc::clone(&calls),
        })
        .build();
        (pipeline, calls)
    }

    fn request(method: Method, cookie: &str, csrf: Option<&str>, body: &'static str) -> Request {
        let mut builder = http::Request::builder()
            .method(method)
            .uri("/orders")
            .header(header::COOKIE, cookie);
        if let Some(csrf) = csrf {
            builder = builder.header("x-xsrf-token", csrf);
        }
        builder.body(Bytes::from_static(body.as_bytes())).unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::POST, "/orders")
    }

    #[test]
    fn test_stage_order() {
        let stages = Stage::all();
        assert_eq!(stages[0].name(), "csrf");
        assert_eq!(stages[6].name(), "encode_response");
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
        assert!(!Stage::Authenticate.commits());
        assert!(Stage::TransformIdentity.commits());
    }

    #[tokio::test]
    async fn test_csrf_runs_before_authentication() {
        let (security, calls) = security();
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let pipeline: Pipeline<(), Authenticated, ()> = Pipeline::new(
            Arc::new(security),
            Authorization::none(),
            Arc::new(NoBody),
            Arc::new(move |_: Call<(), Authenticated, ()>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::NO_CONTENT }
            }),
        );

        let req = request(Method::POST, "session=valid; XSRF-TOKEN=t", Some("other"), "");
        match pipeline.run(req, ctx(), (), Encoding::default()).await {
            Outcome::Declined(p) => assert_eq!(p.status(), StatusCode::FORBIDDEN),
            other => panic!("expected declined 403, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_is_declined_with_challenge() {
        let (security, _) = security();
        let failure = security
            .enter(&request(Method::GET, "session=bogus", None, ""))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Authenticate);
        assert!(!failure.is_committed());
        assert_eq!(
            failure.problem.challenge(),
            Some("Cookie realm=\"portcullis\"")
        );
    }

    #[tokio::test]
    async fn test_transform_failure_is_committed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let security = SecurityPipeline::builder(CookieAuth { calls })
            .transform(FnTransformer::new(|_: Authenticated| {
                Err::<u32, _>(Problem::unauthorized("user not provisioned"))
            }));

        let pipeline: Pipeline<(), u32, ()> = Pipeline::new(
            Arc::new(security),
            Authorization::none(),
            Arc::new(NoBody),
            Arc::new(|_: Call<(), u32, ()>| async { StatusCode::OK }),
        );

        let outcome = pipeline
            .run(request(Method::GET, "session=valid", None, ""), ctx(), (), Encoding::default())
            .await;
        assert!(matches!(outcome, Outcome::Committed(ref p) if p.status() == StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_transformed_identity_reaches_guard_caller() {
        let calls = Arc::new(AtomicUsize::new(0));
        let security: SecurityPipeline<String> =
            SecurityPipeline::builder(CookieAuth { calls: Arc::clone(&calls) })
                .transform(FnTransformer::new(|id: Authenticated| Ok(id.user.sub)));

        let user = security
            .enter(&request(Method::GET, "session=valid", None, ""))
            .await
            .unwrap();
        assert_eq!(user, "auth0|alice");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(security.csrf(), &CsrfGuard::default());
    }

    #[derive(Debug, Deserialize)]
    struct NewOrder {
        quantity: u32,
    }

    #[tokio::test]
    async fn test_authorize_then_decode_then_handle() {
        let (security, _) = security();
        let pipeline: Pipeline<(i64,), Authenticated, NewOrder> = Pipeline::new(
            Arc::new(security),
            Authorization::require(|user: &Authenticated, (limit,): &(i64,)| {
                user.user.sub.starts_with("auth0|") && *limit > 0
            }),
            Arc::new(JsonBody::<NewOrder>::new()),
            Arc::new(|call: Call<(i64,), Authenticated, NewOrder>| async move {
                Json(serde_json::json!({ "quantity": call.body.quantity, "limit": call.params.0 }))
            }),
        );

        let ok = pipeline
            .run(
                request(Method::POST, "session=valid; XSRF-TOKEN=t", Some("t"), r#"{"quantity":3}"#),
                ctx(),
                (5,),
                Encoding::default(),
            )
            .await;
        assert!(matches!(ok, Outcome::Handled(ref r) if r.status() == StatusCode::OK));

        let forbidden = pipeline
            .run(
                request(Method::POST, "session=valid; XSRF-TOKEN=t", Some("t"), r#"{"quantity":3}"#),
                ctx(),
                (0,),
                Encoding::default(),
            )
            .await;
        assert!(matches!(forbidden, Outcome::Committed(ref p) if p.status() == StatusCode::FORBIDDEN));

        let bad_body = pipeline
            .run(
                request(Method::POST, "session=valid; XSRF-TOKEN=t", Some("t"), r#"{"quantity":-1}"#),
                ctx(),
                (5,),
                Encoding::default(),
            )
            .await;
        assert!(matches!(bad_body, Outcome::Committed(ref p) if p.status() == StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_unsecured_guard_skips_security() {
        let pipeline: Pipeline<(), (), ()> = Pipeline::new(
            Arc::new(Unsecured),
            Authorization::none(),
            Arc::new(NoBody),
            Arc::new(|_: Call<(), (), ()>| async { StatusCode::OK }),
        );
        // No cookies and no CSRF header on a POST
        let outcome = pipeline
            .run(request(Method::POST, "", None, ""), ctx(), (), Encoding::default())
            .await;
        assert!(matches!(outcome, Outcome::Handled(_)));
    }
}
