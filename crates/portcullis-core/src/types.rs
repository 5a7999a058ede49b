//! Request and response types shared across the workspace.

use bytes::Bytes;
use http_body_util::Full;

/// The HTTP request type seen by routing and the security pipeline.
///
/// The body is fully buffered by the transport adapter before dispatch.
pub type Request = http::Request<Bytes>;

/// The HTTP response type produced by handlers and the boundary.
pub type Response = http::Response<Full<Bytes>>;

/// Media type of rendered problems.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Wraps bytes into a response body.
pub fn full_body(bytes: impl Into<Bytes>) -> Full<Bytes> {
    Full::new(bytes.into())
}
