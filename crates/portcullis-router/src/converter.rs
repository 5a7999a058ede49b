//! Segment converters.
//!
//! A converter turns one (already percent-decoded) path token into a typed
//! value. Converters are pure: the same token always converts the same way.
//!
//! | Converter | Output | Kind |
//! |-----------|--------|------|
//! | [`StrParam`] | `String` | `str` |
//! | [`IntParam`] | `i64` | `int` |
//! | [`UuidParam`] | `uuid::Uuid` | `uuid` |
//! | [`UrlParam`] | `url::Url` | `url` |
//! | [`FnParam`] | any | caller-chosen |
//!
//! The kind is part of the route key: two templates whose typed segments use
//! the same kinds at the same positions address the same registry entry.

use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

/// Converts a path token into a typed value.
pub trait Converter: Send + Sync + 'static {
    /// The converted value.
    type Output: Send + 'static;

    /// Structural kind used in route keys (e.g. `uuid`).
    fn kind(&self) -> &'static str;

    /// Converts a decoded token.
    fn convert(&self, token: &str) -> Result<Self::Output, String>;
}

/// Any non-empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrParam;

impl Converter for StrParam {
    type Output = String;

    fn kind(&self) -> &'static str {
        "str"
    }

    fn convert(&self, token: &str) -> Result<String, String> {
        if token.is_empty() {
            return Err("must not be empty".to_string());
        }
        Ok(token.to_string())
    }
}

/// A signed 64-bit integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntParam;

impl Converter for IntParam {
    type Output = i64;

    fn kind(&self) -> &'static str {
        "int"
    }

    fn convert(&self, token: &str) -> Result<i64, String> {
        token
            .parse::<i64>()
            .map_err(|e| format!("'{token}' is not an integer: {e}"))
    }
}

/// A UUID in any of its textual forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidParam;

impl Converter for UuidParam {
    type Output = Uuid;

    fn kind(&self) -> &'static str {
        "uuid"
    }

    fn convert(&self, token: &str) -> Result<Uuid, String> {
        Uuid::parse_str(token).map_err(|e| format!("'{token}' is not a UUID: {e}"))
    }
}

/// An absolute URI.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlParam;

impl Converter for UrlParam {
    type Output = url::Url;

    fn kind(&self) -> &'static str {
        "url"
    }

    fn convert(&self, token: &str) -> Result<url::Url, String> {
        url::Url::parse(token).map_err(|e| format!("'{token}' is not an absolute URI: {e}"))
    }
}

/// A converter backed by a closure.
///
/// # Example
///
/// ```
/// use portcullis_router::{Converter, FnParam};
///
/// let slug = FnParam::new("slug", |token: &str| {
///     if token.chars().all(|c| c.is_ascii_lowercase() || c == '-') {
///         Ok(token.to_string())
///     } else {
///         Err("only lowercase letters and dashes".to_string())
///     }
/// });
///
/// assert_eq!(slug.convert("hello-world").unwrap(), "hello-world");
/// assert!(slug.convert("Hello").is_err());
/// ```
pub struct FnParam<F, T> {
    kind: &'static str,
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> FnParam<F, T>
where
    F: Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Wraps a conversion function under a route-key kind.
    pub fn new(kind: &'static str, f: F) -> Self {
        Self {
            kind,
            f,
            _output: PhantomData,
        }
    }
}

impl<F, T> Converter for FnParam<F, T>
where
    F: Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn convert(&self, token: &str) -> Result<T, String> {
        (self.f)(token)
    }
}

impl<F, T> fmt::Debug for FnParam<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnParam").field("kind", &self.kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_param() {
        assert_eq!(StrParam.convert("alice").unwrap(), "alice");
        assert!(StrParam.convert("").is_err());
    }

    #[test]
    fn test_int_param() {
        assert_eq!(IntParam.convert("42").unwrap(), 42);
        assert_eq!(IntParam.convert("-7").unwrap(), -7);
        assert!(IntParam.convert("4x").unwrap_err().contains("not an integer"));
    }

    #[test]
    fn test_uuid_param() {
        let id = Uuid::now_v7();
        assert_eq!(UuidParam.convert(&id.to_string()).unwrap(), id);
        assert!(UuidParam.convert("123").is_err());
    }

    #[test]
    fn test_url_param() {
        let url = UrlParam.convert("https://app.example/dash").unwrap();
        assert_eq!(url.host_str(), Some("app.example"));
        assert!(UrlParam.convert("relative/path").is_err());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(StrParam.kind(), "str");
        assert_eq!(IntParam.kind(), "int");
        assert_eq!(UuidParam.kind(), "uuid");
        assert_eq!(UrlParam.kind(), "url");
        assert_eq!(FnParam::new("even", |_: &str| Ok(0_u8)).kind(), "even");
    }
}
