//! Output encoding.
//!
//! Handlers return values implementing [`IntoResponse`]; the dispatcher
//! turns them into HTTP responses with one [`Encoding`] value that is built
//! once at startup and passed explicitly.
//!
//! | Type | Status | Content-Type |
//! |------|--------|--------------|
//! | [`Json<T>`] | 200 | `application/json` |
//! | [`Redirect`] | 302 | none (`Location` + `Set-Cookie`) |
//! | [`Problem`] | from kind | `application/problem+json` |
//! | `()` | 204 | none |

use crate::cookie::SetCookie;
use crate::error::Problem;
use crate::types::{full_body, Response, PROBLEM_JSON};
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// JSON output configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    /// Pretty-print JSON bodies.
    #[serde(default)]
    pub pretty_json: bool,
}

impl Encoding {
    /// Compact JSON output.
    #[must_use]
    pub const fn compact() -> Self {
        Self { pretty_json: false }
    }

    /// Indented JSON output.
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty_json: true }
    }

    /// Serializes a value according to this configuration.
    pub fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<Vec<u8>> {
        if self.pretty_json {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
    }
}

/// Conversion of a handler result into an HTTP response.
pub trait IntoResponse {
    /// Builds the response. Encoding failures are rendered as problems.
    fn into_response(self, encoding: &Encoding) -> Response;

    /// Builds the response, returning encoding failures to the caller.
    fn try_into_response(self, encoding: &Encoding) -> Result<Response, Problem>
    where
        Self: Sized,
    {
        Ok(self.into_response(encoding))
    }
}

impl IntoResponse for Response {
    fn into_response(self, _encoding: &Encoding) -> Response {
        self
    }
}

impl IntoResponse for StatusCode {
    fn into_response(self, _encoding: &Encoding) -> Response {
        let mut response = Response::new(full_body(Bytes::new()));
        *response.status_mut() = self;
        response
    }
}

impl IntoResponse for () {
    fn into_response(self, encoding: &Encoding) -> Response {
        StatusCode::NO_CONTENT.into_response(encoding)
    }
}

impl<R: IntoResponse> IntoResponse for (StatusCode, R) {
    fn into_response(self, encoding: &Encoding) -> Response {
        self.try_into_response(encoding)
            .unwrap_or_else(|problem| problem.into_response(encoding))
    }

    fn try_into_response(self, encoding: &Encoding) -> Result<Response, Problem> {
        let mut response = self.1.try_into_response(encoding)?;
        *response.status_mut() = self.0;
        Ok(response)
    }
}

impl<T: IntoResponse> IntoResponse for Result<T, Problem> {
    fn into_response(self, encoding: &Encoding) -> Response {
        match self {
            Ok(value) => value.into_response(encoding),
            Err(problem) => problem.into_response(encoding),
        }
    }

    fn try_into_response(self, encoding: &Encoding) -> Result<Response, Problem> {
        self?.try_into_response(encoding)
    }
}

/// A JSON response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self, encoding: &Encoding) -> Response {
        self.try_into_response(encoding)
            .unwrap_or_else(|problem| problem.into_response(encoding))
    }

    fn try_into_response(self, encoding: &Encoding) -> Result<Response, Problem> {
        let body = encoding
            .to_json(&self.0)
            .map_err(|e| Problem::internal_with_cause("response serialization failed", e))?;
        Ok(with_content_type(StatusCode::OK, body, "application/json"))
    }
}

/// A `302 Found` redirect carrying cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    location: String,
    cookies: Vec<SetCookie>,
}

impl Redirect {
    /// Redirects to a location.
    #[must_use]
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            cookies: Vec::new(),
        }
    }

    /// Attaches a cookie.
    #[must_use]
    pub fn with_cookie(mut self, cookie: SetCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Returns the target location.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns the attached cookies.
    #[must_use]
    pub fn cookies(&self) -> &[SetCookie] {
        &self.cookies
    }
}

impl IntoResponse for Redirect {
    fn into_response(self, encoding: &Encoding) -> Response {
        self.try_into_response(encoding)
            .unwrap_or_else(|problem| problem.into_response(encoding))
    }

    fn try_into_response(self, encoding: &Encoding) -> Result<Response, Problem> {
        let Ok(location) = HeaderValue::from_str(&self.location) else {
            return Err(Problem::internal(
                "redirect target is not a valid header value",
            ));
        };

        let mut response = StatusCode::FOUND.into_response(encoding);
        let headers = response.headers_mut();
        headers.insert(header::LOCATION, location);
        for cookie in &self.cookies {
            match HeaderValue::from_str(&cookie.to_header_value()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => {
                    tracing::warn!(cookie = cookie.name(), "dropping unencodable cookie");
                }
            }
        }
        Ok(response)
    }
}

impl IntoResponse for Problem {
    fn into_response(self, encoding: &Encoding) -> Response {
        let body = encoding.to_json(&self.to_document()).unwrap_or_else(|_| {
            br#"{"type":"about:blank","title":"Internal Server Error","status":500}"#.to_vec()
        });
        let mut response = with_content_type(self.status(), body, PROBLEM_JSON);

        if !self.allowed_methods().is_empty() {
            let allow = self
                .allowed_methods()
                .iter()
                .map(http::Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            insert_header(&mut response, header::ALLOW, &allow);
        }
        if let Some(challenge) = self.challenge() {
            insert_header(&mut response, header::WWW_AUTHENTICATE, challenge);
        }
        response
    }
}

fn with_content_type(status: StatusCode, body: Vec<u8>, content_type: &'static str) -> Response {
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn insert_header(response: &mut Response, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::SameSite;
    use http::Method;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_problem_rendering() {
        let problem = Problem::method_not_allowed(&Method::DELETE, vec![Method::GET, Method::POST]);
        let id = problem.error_id().to_string();
        let response = problem.into_response(&Encoding::default());

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");

        let json = body_json(response).await;
        assert_eq!(json["type"], "about:blank");
        assert_eq!(json["status"], 405);
        assert_eq!(json["errorId"], id);
    }

    #[tokio::test]
    async fn test_unauthorized_carries_challenge() {
        let response = Problem::unauthorized("no session")
            .with_challenge("Cookie realm=\"portcullis\"")
            .into_response(&Encoding::default());

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Cookie realm=\"portcullis\""
        );
    }

    #[tokio::test]
    async fn test_json_pretty_and_compact() {
        let value = serde_json::json!({ "a": 1 });

        let compact = Json(value.clone()).into_response(&Encoding::compact());
        let bytes = compact.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"a":1}"#);

        let pretty = Json(value).into_response(&Encoding::pretty());
        let bytes = pretty.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.contains(&b'\n'));
    }

    #[test]
    fn test_redirect_with_cookies() {
        let response = Redirect::to("https://app.example/dash")
            .with_cookie(SetCookie::new("session", "s1").http_only(true).same_site(SameSite::Lax))
            .with_cookie(SetCookie::remove("auth_state"))
            .into_response(&Encoding::default());

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://app.example/dash");
        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("session=s1"));
        assert!(cookies[1].contains("Max-Age=0"));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    #[test]
    fn test_serialization_failure_is_returned() {
        let problem = Json(Unserializable)
            .try_into_response(&Encoding::default())
            .unwrap_err();
        assert!(problem.is_server_error());
        assert!(problem.cause().unwrap().to_string().contains("not representable"));

        let problem = (StatusCode::CREATED, Json(Unserializable))
            .try_into_response(&Encoding::default())
            .unwrap_err();
        assert_eq!(problem.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let rendered = Json(Unserializable).into_response(&Encoding::default());
        assert_eq!(rendered.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unit_and_status_tuple() {
        assert_eq!(().into_response(&Encoding::default()).status(), StatusCode::NO_CONTENT);
        let created = (StatusCode::CREATED, Json(1)).into_response(&Encoding::default());
        assert_eq!(created.status(), StatusCode::CREATED);
    }
}
