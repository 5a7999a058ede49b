//! Handlers and the values they receive.

use crate::pipeline::{Stage, StageFailure};
use portcullis_core::{
    Cookies, Encoding, IntoResponse, Json, Problem, Redirect, Request, RequestContext, Response,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a handler receives once the pipeline has passed.
#[derive(Debug)]
pub struct Call<P, U, B> {
    /// Typed path parameters.
    pub params: P,
    /// The transformed identity (`()` on unsecured routes).
    pub user: U,
    /// The decoded payload (`()` when the route declares none).
    pub body: B,
    /// The original request.
    pub request: Request,
    /// Correlation data.
    pub context: RequestContext,
}

impl<P, U, B> Call<P, U, B> {
    /// Decodes the query string. A missing query decodes as empty.
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, Problem> {
        let query = self.request.uri().query().unwrap_or("");
        serde_urlencoded::from_str(query)
            .map_err(|e| Problem::bad_request(format!("invalid query string: {e}")))
    }

    /// Parses the request cookies.
    #[must_use]
    pub fn cookies(&self) -> Cookies {
        Cookies::from_headers(self.request.headers())
    }

    /// Returns a header as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name).and_then(|v| v.to_str().ok())
    }
}

/// Values a handler may return.
///
/// Plain responses are successes; `Err(problem)` is a committed failure.
pub trait HandlerOutput: Send {
    /// The successful value, encoded after the handler returns.
    type Value: IntoResponse;

    /// Separates the handler's own failure from the value to encode.
    fn into_value(self) -> Result<Self::Value, Problem>;
}

impl<T: IntoResponse + Send> HandlerOutput for Result<T, Problem> {
    type Value = T;

    fn into_value(self) -> Result<T, Problem> {
        self
    }
}

macro_rules! impl_handler_output {
    ($($ty:ty),+) => {
        $(
            impl HandlerOutput for $ty {
                type Value = Self;

                fn into_value(self) -> Result<Self, Problem> {
                    Ok(self)
                }
            }
        )+
    };
}

impl_handler_output!(Response, http::StatusCode, (), Redirect);

impl<T: Serialize + Send> HandlerOutput for Json<T> {
    type Value = Self;

    fn into_value(self) -> Result<Self, Problem> {
        Ok(self)
    }
}

impl<R: IntoResponse + Send> HandlerOutput for (http::StatusCode, R) {
    type Value = Self;

    fn into_value(self) -> Result<Self, Problem> {
        Ok(self)
    }
}

/// A route handler.
///
/// Implemented for every `async` function or closure taking a [`Call`].
/// A failure is reported at [`Stage::Handler`] when the handler returns a
/// problem and at [`Stage::EncodeResponse`] when its value cannot be encoded.
pub trait Handler<P, U, B>: Send + Sync + 'static {
    /// Invokes the handler and encodes its output.
    fn call(
        &self,
        call: Call<P, U, B>,
        encoding: Encoding,
    ) -> BoxFuture<'static, Result<Response, StageFailure>>;
}

impl<F, Fut, O, P, U, B> Handler<P, U, B> for F
where
    F: Fn(Call<P, U, B>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: HandlerOutput,
{
    fn call(
        &self,
        call: Call<P, U, B>,
        encoding: Encoding,
    ) -> BoxFuture<'static, Result<Response, StageFailure>> {
        let fut = self(call);
        Box::pin(async move {
            let value = fut
                .await
                .into_value()
                .map_err(|p| StageFailure::new(Stage::Handler, p))?;
            value
                .try_into_response(&encoding)
                .map_err(|p| StageFailure::new(Stage::EncodeResponse, p))
        })
    }
}
