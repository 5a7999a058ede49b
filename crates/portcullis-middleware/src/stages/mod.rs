//! Pipeline stages, in execution order.
//!
//! | Stage | Module | Failure |
//! |-------|--------|---------|
//! | 1 | [`csrf`] | 403 |
//! | 2 | [`authenticate`] | 401 + challenge |
//! | 3 | [`transform`] | 401 (committed) |
//! | 4 | [`authorize`] | 403 (committed) |
//! | 5 | [`decode`] | 400 (committed) |

pub mod authenticate;
pub mod authorize;
pub mod csrf;
pub mod decode;
pub mod transform;

pub use authenticate::{challenge, Authenticated, Authenticator, DEFAULT_REALM};
pub use authorize::Authorization;
pub use csrf::{constant_time_eq, is_state_mutating, CsrfGuard, DEFAULT_CSRF_COOKIE, DEFAULT_CSRF_HEADER};
pub use decode::{decode_json, Decode, JsonBody, NoBody};
pub use transform::{FnTransformer, IdentityTransformer, PassThrough};
