//! Typed routing for Portcullis.
//!
//! Routes are declared as typed [`PathTemplate`]s; capturing a path yields a
//! tuple of converted parameters, so handlers never see raw strings:
//!
//! ```rust
//! use portcullis_router::{PathTemplate, Router, UuidParam};
//! use http::Method;
//!
//! let user = PathTemplate::root().lit("users").param("id", UuidParam);
//!
//! let mut router = Router::new();
//! router.register(&user, Method::GET, "getUser").unwrap();
//!
//! let id = uuid::Uuid::now_v7();
//! let path = format!("/users/{id}");
//! let found = router.resolve(&Method::GET, &path).unwrap();
//! assert_eq!(*found.handler, "getUser");
//!
//! let (captured,) = user.capture(&path).unwrap();
//! assert_eq!(captured, id);
//! ```
//!
//! # Route keys
//!
//! A template's [`RouteKey`] is its literal/typed signature. Registrations
//! sharing a key share one [`MethodTable`]; claiming the same method twice,
//! or adding a key that an earlier typed key would always hide, is a
//! build-time [`RouteConflict`].
//!
//! ```text
//!   /users/{id:uuid}       GET  ─┐
//!   /users/{user_id:uuid}  PUT  ─┴─▶  key /users/{uuid}  [GET, PUT]
//! ```

mod converter;
mod error;
mod method_table;
mod router;
mod template;

pub use converter::{Converter, FnParam, IntParam, StrParam, UrlParam, UuidParam};
pub use error::{ParamError, RouteConflict, RouteError, TemplateError};
pub use method_table::MethodTable;
pub use router::{RouteMatch, Router};
pub use template::{Append, CaptureError, PathTemplate, RouteKey, Segment, SegmentKey};
