//! Typed path templates.
//!
//! A [`PathTemplate<T>`] is an ordered list of literal and typed segments
//! together with a capture function producing `T`, a tuple holding one value
//! per typed segment in declaration order.
//!
//! ```text
//!   PathTemplate::root()          PathTemplate<()>
//!     .lit("users")               PathTemplate<()>
//!     .param("id", UuidParam)     PathTemplate<(Uuid,)>
//!     .lit("posts")               PathTemplate<(Uuid,)>
//!     .param("n", IntParam)       PathTemplate<(Uuid, i64)>
//! ```

use crate::converter::Converter;
use crate::error::{ParamError, TemplateError};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Path tokens after splitting on `/` and dropping empty segments.
pub(crate) type Tokens<'a> = SmallVec<[&'a str; 8]>;

/// Splits a request path into its non-empty segments.
pub(crate) fn split_path(path: &str) -> Tokens<'_> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// One segment of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches the text verbatim (case-sensitive).
    Literal(String),
    /// Converts the token with a named converter.
    Typed {
        /// Parameter name, used in error reports.
        name: String,
        /// Converter kind, used in route keys.
        kind: &'static str,
    },
}

/// Structural signature of one segment.
///
/// Variant order matters: literals sort before typed segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentKey {
    /// A literal segment.
    Literal(String),
    /// A typed segment of the given converter kind.
    Typed(&'static str),
}

/// Structural identity of a template, used for grouping and precedence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey(Vec<SegmentKey>);

impl RouteKey {
    /// Returns the segment signatures.
    #[must_use]
    pub fn segments(&self) -> &[SegmentKey] {
        &self.0
    }

    /// Returns true when the tokens have this key's shape and literals.
    pub(crate) fn matches_structure(&self, tokens: &[&str]) -> bool {
        self.0.len() == tokens.len()
            && self.0.iter().zip(tokens).all(|(key, token)| match key {
                SegmentKey::Literal(text) => text == token,
                SegmentKey::Typed(_) => true,
            })
    }

    /// Returns true when every path structurally matching `other` also
    /// matches `self`.
    pub(crate) fn covers(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|pair| match pair {
                (SegmentKey::Typed(_), _) => true,
                (SegmentKey::Literal(a), SegmentKey::Literal(b)) => a == b,
                (SegmentKey::Literal(_), SegmentKey::Typed(_)) => false,
            })
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            match segment {
                SegmentKey::Literal(text) => write!(f, "/{text}")?,
                SegmentKey::Typed(kind) => write!(f, "/{{{kind}}}")?,
            }
        }
        Ok(())
    }
}

/// Appends a value to a tuple.
pub trait Append<V> {
    /// The tuple with `V` appended.
    type Output;

    /// Appends `value`.
    fn append(self, value: V) -> Self::Output;
}

impl<V> Append<V> for () {
    type Output = (V,);

    fn append(self, value: V) -> Self::Output {
        (value,)
    }
}

macro_rules! impl_append {
    ($($t:ident),+) => {
        impl<$($t,)+ V> Append<V> for ($($t,)+) {
            type Output = ($($t,)+ V);

            #[allow(non_snake_case)]
            fn append(self, value: V) -> Self::Output {
                let ($($t,)+) = self;
                ($($t,)+ value)
            }
        }
    };
}

impl_append!(A);
impl_append!(A, B);
impl_append!(A, B, C);
impl_append!(A, B, C, D);
impl_append!(A, B, C, D, E);
impl_append!(A, B, C, D, E, F);
impl_append!(A, B, C, D, E, F, G);

type CaptureFn<T> = Arc<dyn Fn(&[&str]) -> Result<T, ParamError> + Send + Sync>;

/// Why a path did not capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Segment count or a literal differs.
    Mismatch,
    /// The structure matches but a converter rejected its token.
    Param(ParamError),
}

/// A compiled route pattern producing typed parameters `T`.
///
/// # Example
///
/// ```
/// use portcullis_router::{IntParam, PathTemplate, StrParam};
///
/// let template = PathTemplate::root()
///     .lit("orgs")
///     .param("org", StrParam)
///     .lit("members")
///     .param("page", IntParam);
///
/// let (org, page) = template.capture("/orgs/acme/members/3").unwrap();
/// assert_eq!(org, "acme");
/// assert_eq!(page, 3);
/// ```
pub struct PathTemplate<T> {
    segments: Vec<Segment>,
    capture: CaptureFn<T>,
}

impl<T> Clone for PathTemplate<T> {
    fn clone(&self) -> Self {
        Self {
            segments: self.segments.clone(),
            capture: Arc::clone(&self.capture),
        }
    }
}

impl PathTemplate<()> {
    /// The root template, matching `/`.
    #[must_use]
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            capture: Arc::new(|_: &[&str]| Ok(())),
        }
    }

    /// Compiles a literal-only pattern such as `/api/v1/users`.
    pub fn parse(pattern: &str) -> Result<Self, TemplateError> {
        if pattern.contains(['{', '}']) {
            return Err(TemplateError::Placeholder(pattern.to_string()));
        }
        Ok(Self::root().lit(pattern))
    }
}

impl<T: Send + 'static> PathTemplate<T> {
    /// Appends literal segments. Slashes inside `text` separate segments.
    #[must_use]
    pub fn lit(mut self, text: &str) -> Self {
        self.segments.extend(
            split_path(text)
                .into_iter()
                .map(|s| Segment::Literal(s.to_string())),
        );
        self
    }

    /// Appends a typed segment converted by `converter`.
    #[must_use]
    pub fn param<C>(self, name: &str, converter: C) -> PathTemplate<T::Output>
    where
        C: Converter,
        T: Append<C::Output>,
        T::Output: Send + 'static,
    {
        let index = self.typed_count();
        let name = name.to_string();
        let mut segments = self.segments;
        segments.push(Segment::Typed {
            name: name.clone(),
            kind: converter.kind(),
        });

        let head = self.capture;
        let capture: CaptureFn<T::Output> = Arc::new(move |tokens: &[&str]| {
            let values = head(tokens)?;
            let token = tokens
                .get(index)
                .copied()
                .ok_or_else(|| ParamError::new(&name, "", "missing segment"))?;
            let decoded = urlencoding::decode(token)
                .map_err(|_| ParamError::new(&name, token, "not valid UTF-8 once decoded"))?;
            let value = converter
                .convert(&decoded)
                .map_err(|message| ParamError::new(&name, token, message))?;
            Ok(values.append(value))
        });

        PathTemplate { segments, capture }
    }
}

impl<T> PathTemplate<T> {
    /// Returns the compiled segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the structural key of this template.
    #[must_use]
    pub fn key(&self) -> RouteKey {
        RouteKey(
            self.segments
                .iter()
                .map(|s| match s {
                    Segment::Literal(text) => SegmentKey::Literal(text.clone()),
                    Segment::Typed { kind, .. } => SegmentKey::Typed(*kind),
                })
                .collect(),
        )
    }

    /// Returns the number of typed segments.
    #[must_use]
    pub fn typed_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Typed { .. }))
            .count()
    }

    /// Captures typed parameters from a request path.
    pub fn capture(&self, path: &str) -> Result<T, CaptureError> {
        let tokens = split_path(path);
        if !self.key().matches_structure(&tokens) {
            return Err(CaptureError::Mismatch);
        }
        self.capture_tokens(&tokens).map_err(CaptureError::Param)
    }

    /// Runs the converters over structurally matching tokens.
    pub(crate) fn capture_tokens(&self, tokens: &[&str]) -> Result<T, ParamError> {
        let typed: Tokens<'_> = self
            .segments
            .iter()
            .zip(tokens)
            .filter(|(s, _)| matches!(s, Segment::Typed { .. }))
            .map(|(_, t)| *t)
            .collect();
        (self.capture)(&typed[..])
    }
}

impl<T> fmt::Debug for PathTemplate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathTemplate")
            .field("pattern", &self.to_string())
            .finish()
    }
}

impl<T> fmt::Display for PathTemplate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => write!(f, "/{text}")?,
                Segment::Typed { name, kind } => write!(f, "/{{{name}:{kind}}}")?,
            }
        }
        Ok(())
    }
}
