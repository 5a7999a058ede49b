//! # Portcullis Middleware
//!
//! The fixed-order security pipeline wrapped around every route handler.
//!
//! ## Pipeline Stages
//!
//! | Stage | Purpose | Failure |
//! |-------|---------|---------|
//! | 1 | CSRF check (POST, PUT, DELETE, PATCH only) | 403, declined |
//! | 2 | Authenticate (session lookup) | 401 + `WWW-Authenticate`, declined |
//! | 3 | Transform identity | 401, committed |
//! | 4 | Authorize (optional predicate) | 403, committed |
//! | 5 | Decode body (only if declared) | 400 with field detail, committed |
//! | 6 | Handler | committed |
//! | 7 | Encode response | 500, committed |
//!
//! Unsecured routes skip stages 1-4.
//!
//! ```
//! use portcullis_middleware::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 7);
//! assert_eq!(stages[0].name(), "csrf");
//! assert!(!stages[1].commits());
//! assert!(stages[2].commits());
//! ```

#![doc(html_root_url = "https://docs.rs/portcullis-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod handler;
pub mod pipeline;
pub mod stages;

pub use handler::{BoxFuture, Call, Handler, HandlerOutput};
pub use pipeline::{
    Guard, Outcome, Pipeline, SecurityPipeline, SecurityPipelineBuilder, Stage, StageFailure,
    Unsecured,
};
pub use stages::{
    Authenticated, Authenticator, Authorization, CsrfGuard, Decode, FnTransformer,
    IdentityTransformer, JsonBody, NoBody, PassThrough,
};
