//! Identity transformation (stage 3).
//!
//! Maps the raw [`Authenticated`] identity into the user type a handler
//! expects, typically by loading the application's own user record. From
//! this stage on, failures are committed.

use crate::stages::authenticate::Authenticated;
use async_trait::async_trait;
use portcullis_core::Problem;
use std::marker::PhantomData;

/// Maps the raw identity into a domain user.
#[async_trait]
pub trait IdentityTransformer<U>: Send + Sync + 'static {
    /// Transforms the identity. Failures should be Unauthorized problems.
    async fn transform(&self, identity: Authenticated) -> Result<U, Problem>;
}

/// Hands the raw identity to the handler unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl IdentityTransformer<Authenticated> for PassThrough {
    async fn transform(&self, identity: Authenticated) -> Result<Authenticated, Problem> {
        Ok(identity)
    }
}

/// A synchronous transformer backed by a closure.
pub struct FnTransformer<F, U> {
    f: F,
    _user: PhantomData<fn() -> U>,
}

impl<F, U> FnTransformer<F, U>
where
    F: Fn(Authenticated) -> Result<U, Problem> + Send + Sync + 'static,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _user: PhantomData,
        }
    }
}

#[async_trait]
impl<F, U> IdentityTransformer<U> for FnTransformer<F, U>
where
    F: Fn(Authenticated) -> Result<U, Problem> + Send + Sync + 'static,
    U: Send + 'static,
{
    async fn transform(&self, identity: Authenticated) -> Result<U, Problem> {
        (self.f)(identity)
    }
}
