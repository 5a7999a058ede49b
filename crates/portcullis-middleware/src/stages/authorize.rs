//! Authorization (stage 4).

use portcullis_core::Problem;
use std::fmt;
use std::sync::Arc;

type Predicate<U, P> = Arc<dyn Fn(&U, &P) -> bool + Send + Sync>;

/// The authorization policy of one route.
///
/// Routes choose a predicate over the transformed user and the typed path
/// parameters, or explicitly opt out with [`Authorization::none`].
pub struct Authorization<U, P> {
    predicate: Option<Predicate<U, P>>,
}

impl<U, P> Authorization<U, P> {
    /// No authorization check. CSRF and authentication still apply.
    #[must_use]
    pub fn none() -> Self {
        Self { predicate: None }
    }

    /// Allows the request only when `predicate` returns true.
    pub fn require<F>(predicate: F) -> Self
    where
        F: Fn(&U, &P) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Returns true when a predicate is configured.
    #[must_use]
    pub fn is_enforced(&self) -> bool {
        self.predicate.is_some()
    }

    /// Evaluates the policy.
    pub fn check(&self, user: &U, params: &P) -> Result<(), Problem> {
        match &self.predicate {
            Some(predicate) if !predicate(user, params) => {
                Err(Problem::forbidden("not permitted to access this resource"))
            }
            _ => Ok(()),
        }
    }
}

impl<U, P> Clone for Authorization<U, P> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
        }
    }
}

impl<U, P> fmt::Debug for Authorization<U, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("enforced", &self.is_enforced())
            .finish()
    }
}
