//! CSRF check (stage 1).
//!
//! State-mutating requests (POST, PUT, DELETE, PATCH) must echo the value of
//! the anti-CSRF cookie in a request header. The cookie is issued at login
//! and is readable by page scripts, so only same-origin pages can copy it
//! into the header.
//!
//! ```text
//! Cookie: XSRF-TOKEN=k3y      X-XSRF-TOKEN: k3y      → pass
//! Cookie: XSRF-TOKEN=k3y      X-XSRF-TOKEN: other    → 403
//! Cookie: XSRF-TOKEN=k3y      (no header)            → 403
//! ```

use http::Method;
use portcullis_core::{Cookies, Problem, Request};

/// Default anti-CSRF cookie name.
pub const DEFAULT_CSRF_COOKIE: &str = "XSRF-TOKEN";

/// Default anti-CSRF header name.
pub const DEFAULT_CSRF_HEADER: &str = "X-XSRF-TOKEN";

/// Returns true for methods that change server state.
#[must_use]
pub fn is_state_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    )
}

/// Compares two byte strings in time independent of where they differ.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The double-submit CSRF check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfGuard {
    cookie_name: String,
    header_name: String,
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self::new(DEFAULT_CSRF_COOKIE, DEFAULT_CSRF_HEADER)
    }
}

impl CsrfGuard {
    /// Creates a guard with custom cookie and header names.
    #[must_use]
    pub fn new(cookie_name: impl Into<String>, header_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            header_name: header_name.into(),
        }
    }

    /// Returns the cookie name.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Returns the header name.
    #[must_use]
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Checks a request. Safe methods always pass.
    pub fn check(&self, request: &Request) -> Result<(), Problem> {
        if !is_state_mutating(request.method()) {
            return Ok(());
        }

        let cookies = Cookies::from_headers(request.headers());
        let Some(cookie) = cookies.get_non_empty(&self.cookie_name) else {
            return Err(Problem::forbidden("missing CSRF cookie"));
        };
        let Some(header) = request
            .headers()
            .get(self.header_name.as_str())
            .map(http::HeaderValue::as_bytes)
            .filter(|h| !h.is_empty())
        else {
            return Err(Problem::forbidden("missing CSRF header"));
        };

        if constant_time_eq(cookie.as_bytes(), header) {
            Ok(())
        } else {
            Err(Problem::forbidden("CSRF token mismatch"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::header::COOKIE;
    use portcullis_core::ProblemKind;

    fn request(method: Method, cookie: Option<&str>, header: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(method).uri("/orders");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(header) = header {
            builder = builder.header(DEFAULT_CSRF_HEADER, header);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn test_safe_methods_pass() {
        let guard = CsrfGuard::default();
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert!(guard.check(&request(method, None, None)).is_ok());
        }
    }

    #[test]
    fn test_matching_pair_passes() {
        let guard = CsrfGuard::default();
        let req = request(Method::POST, Some("XSRF-TOKEN=abc; session=s"), Some("abc"));
        assert!(guard.check(&req).is_ok());
    }

    #[test]
    fn test_every_mutating_method_is_checked() {
        let guard = CsrfGuard::default();
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            let err = guard.check(&request(method, None, None)).unwrap_err();
            assert_eq!(err.kind(), ProblemKind::Forbidden);
        }
    }

    #[test]
    fn test_mismatch_is_forbidden() {
        let guard = CsrfGuard::default();
        let err = guard
            .check(&request(Method::DELETE, Some("XSRF-TOKEN=abc"), Some("abd")))
            .unwrap_err();
        assert_eq!(err.detail(), Some("CSRF token mismatch"));
    }

    #[test]
    fn test_missing_header_is_forbidden() {
        let guard = CsrfGuard::default();
        let err = guard
            .check(&request(Method::PUT, Some("XSRF-TOKEN=abc"), None))
            .unwrap_err();
        assert_eq!(err.detail(), Some("missing CSRF header"));
    }

    #[test]
    fn test_empty_cookie_and_header_do_not_match() {
        let guard = CsrfGuard::default();
        let err = guard
            .check(&request(Method::POST, Some("XSRF-TOKEN="), Some("")))
            .unwrap_err();
        assert_eq!(err.kind(), ProblemKind::Forbidden);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"token2"));
        assert!(constant_time_eq(b"", b""));
    }
}
