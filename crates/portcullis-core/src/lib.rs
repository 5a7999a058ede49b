//! # Portcullis Core
//!
//! Core types shared by every Portcullis crate:
//!
//! - [`Problem`] - the uniform error representation rendered as
//!   `application/problem+json`
//! - [`RequestId`] / [`RequestContext`] - per-request correlation data
//! - [`OidcUser`] - the decoded OpenID Connect identity stored in sessions
//! - [`Cookies`] / [`SetCookie`] - cookie parsing and `Set-Cookie` rendering
//! - [`Encoding`] / [`IntoResponse`] - explicit output encoding configuration

#![doc(html_root_url = "https://docs.rs/portcullis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
pub mod cookie;
pub mod encoding;
mod error;
mod identity;
mod types;

pub use context::{RequestContext, RequestId, REQUEST_ID_HEADER};
pub use cookie::{Cookies, SameSite, SetCookie};
pub use encoding::{Encoding, IntoResponse, Json, Redirect};
pub use error::{FieldErrors, Problem, ProblemDocument, ProblemKind, ProblemResult};
pub use identity::OidcUser;
pub use types::{full_body, Request, Response, PROBLEM_JSON};
