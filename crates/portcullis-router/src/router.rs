//! The route registry.
//!
//! Routes are grouped by [`RouteKey`]. Entries are visited in key order, so
//! resolution is deterministic and independent of registration order:
//!
//! 1. **Literal segments** (e.g., `/users/me`)
//! 2. **Typed segments** (e.g., `/users/{id:uuid}`)
//!
//! The first entry whose structure matches the path is the candidate. A
//! converter failure on that candidate is reported as
//! [`RouteError::InvalidParam`]; other entries are not tried.
//!
//! Because of that, a key visited after a typed key of the same shape that
//! accepts all of its paths (`/users/{uuid}` after `/users/{int}`) could
//! never be selected. Registering one is a [`RouteConflict::Shadowed`].

use crate::error::{ParamError, RouteConflict, RouteError};
use crate::method_table::MethodTable;
use crate::template::{split_path, PathTemplate, RouteKey};
use http::Method;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type Validator = Arc<dyn Fn(&[&str]) -> Result<(), ParamError> + Send + Sync>;

struct Entry<H> {
    pattern: String,
    validate: Validator,
    methods: MethodTable<H>,
}

/// A resolved route.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    /// The selected handler.
    pub handler: &'a H,
    /// The matched route key.
    pub key: &'a RouteKey,
}

/// A registry of typed routes.
///
/// # Example
///
/// ```rust
/// use portcullis_router::{PathTemplate, Router, UuidParam, RouteError};
/// use http::Method;
///
/// let users = PathTemplate::parse("/users").unwrap();
/// let user = PathTemplate::root().lit("users").param("id", UuidParam);
///
/// let mut router = Router::new();
/// router.register(&users, Method::GET, "listUsers").unwrap();
/// router.register(&user, Method::GET, "getUser").unwrap();
/// router.register(&user, Method::DELETE, "deleteUser").unwrap();
///
/// let found = router.resolve(&Method::GET, "/users").unwrap();
/// assert_eq!(*found.handler, "listUsers");
///
/// let id = uuid::Uuid::now_v7();
/// match router.resolve(&Method::PUT, &format!("/users/{id}")) {
///     Err(RouteError::MethodNotAllowed { allowed, .. }) => {
///         assert_eq!(allowed, vec![Method::DELETE, Method::GET]);
///     }
///     _ => unreachable!(),
/// }
/// ```
pub struct Router<H> {
    entries: BTreeMap<RouteKey, Entry<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<H> Router<H> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a template and method.
    ///
    /// Templates with the same key share one method table; claiming a
    /// method twice or adding an unreachable key is a [`RouteConflict`].
    pub fn register<T: Send + 'static>(
        &mut self,
        template: &PathTemplate<T>,
        method: Method,
        handler: H,
    ) -> Result<(), RouteConflict> {
        let key = template.key();
        if !self.entries.contains_key(&key) {
            self.check_reachable(&key)?;
        }
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            let template = template.clone();
            Entry {
                pattern: template.to_string(),
                validate: Arc::new(move |tokens: &[&str]| {
                    template.capture_tokens(tokens).map(|_| ())
                }),
                methods: MethodTable::new(),
            }
        });
        entry.methods.insert(method, handler).map_err(|method| {
            tracing::debug!(route = %key, %method, "duplicate route registration");
            RouteConflict::DuplicateMethod {
                route: key.to_string(),
                method,
            }
        })
    }

    /// Fails if `key` and an existing key of the same shape would hide one
    /// another.
    fn check_reachable(&self, key: &RouteKey) -> Result<(), RouteConflict> {
        for existing in self.entries.keys().filter(|k| *k != key) {
            let (first, second) = if existing < key {
                (existing, key)
            } else {
                (key, existing)
            };
            if first.covers(second) {
                tracing::debug!(route = %second, shadowed_by = %first, "unreachable route");
                return Err(RouteConflict::Shadowed {
                    route: second.to_string(),
                    shadowed_by: first.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Merges another router into this one.
    ///
    /// Conflicts are detected before anything is moved, so a failed merge
    /// leaves `self` untouched.
    pub fn merge(&mut self, other: Self) -> Result<(), RouteConflict> {
        for (key, theirs) in &other.entries {
            match self.entries.get(key) {
                Some(ours) => {
                    if let Some(method) = ours.methods.overlap(&theirs.methods).into_iter().next()
                    {
                        return Err(RouteConflict::DuplicateMethod {
                            route: key.to_string(),
                            method,
                        });
                    }
                }
                None => self.check_reachable(key)?,
            }
        }

        for (key, theirs) in other.entries {
            match self.entries.get_mut(&key) {
                Some(ours) => {
                    // Overlap was ruled out above
                    let _ = ours.methods.merge(theirs.methods);
                }
                None => {
                    self.entries.insert(key, theirs);
                }
            }
        }
        Ok(())
    }

    /// Resolves a request to a handler.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch<'_, H>, RouteError> {
        let tokens = split_path(path);
        let Some((key, entry)) = self
            .entries
            .iter()
            .find(|(key, _)| key.matches_structure(&tokens))
        else {
            return Err(RouteError::NotFound(path.to_string()));
        };

        (entry.validate)(&tokens[..])?;

        match entry.methods.get(method) {
            Some(handler) => {
                tracing::debug!(route = %entry.pattern, %method, "route resolved");
                Ok(RouteMatch { handler, key })
            }
            None => Err(RouteError::MethodNotAllowed {
                method: method.clone(),
                allowed: entry.methods.allowed_methods(),
            }),
        }
    }

    /// Returns the method table for a route key.
    #[must_use]
    pub fn methods(&self, key: &RouteKey) -> Option<&MethodTable<H>> {
        self.entries.get(key).map(|e| &e.methods)
    }

    /// Iterates over route keys in precedence order.
    pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.entries.keys()
    }

    /// Returns the number of route keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H> fmt::Debug for Router<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|e| {
                format!("{} {:?}", e.pattern, e.methods.allowed_methods())
            }))
            .finish()
    }
}
