//! Per-route method dispatch.
//!
//! A [`MethodTable`] maps HTTP methods to handlers for one route key. Tables
//! are built incrementally: registering or merging a method that is already
//! present is a conflict, never an overwrite.

use http::Method;
use std::collections::BTreeMap;

/// Maps HTTP methods to handlers for a single route.
///
/// Methods are kept sorted by name, so [`MethodTable::allowed_methods`] is
/// deterministic and independent of registration order.
///
/// # Example
///
/// ```rust
/// use portcullis_router::MethodTable;
/// use http::Method;
///
/// let mut table = MethodTable::new();
/// table.insert(Method::POST, "createUser").unwrap();
/// table.insert(Method::GET, "listUsers").unwrap();
///
/// assert_eq!(table.get(&Method::GET), Some(&"listUsers"));
/// assert_eq!(table.allowed_methods(), vec![Method::GET, Method::POST]);
/// assert!(table.insert(Method::GET, "again").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct MethodTable<H> {
    handlers: BTreeMap<String, (Method, H)>,
}

impl<H> Default for MethodTable<H> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<H> MethodTable<H> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Returns the method back if it is already taken.
    pub fn insert(&mut self, method: Method, handler: H) -> Result<(), Method> {
        let name = method.as_str().to_string();
        if self.handlers.contains_key(&name) {
            return Err(method);
        }
        self.handlers.insert(name, (method, handler));
        Ok(())
    }

    /// Returns the handler for a method.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<&H> {
        self.handlers.get(method.as_str()).map(|(_, h)| h)
    }

    /// Returns true if a handler is registered for the method.
    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        self.handlers.contains_key(method.as_str())
    }

    /// Returns the methods present in both tables.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Vec<Method> {
        other
            .handlers
            .values()
            .filter(|(m, _)| self.contains(m))
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Merges another table into this one.
    ///
    /// Nothing is merged when the tables share a method; the shared methods
    /// are returned instead.
    pub fn merge(&mut self, other: Self) -> Result<(), Vec<Method>> {
        let overlap = self.overlap(&other);
        if !overlap.is_empty() {
            return Err(overlap);
        }
        self.handlers.extend(other.handlers);
        Ok(())
    }

    /// Returns the registered methods, sorted by name.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        self.handlers.values().map(|(m, _)| m.clone()).collect()
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no methods are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Iterates over `(method, handler)` pairs in method-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&Method, &H)> {
        self.handlers.values().map(|(m, h)| (m, h))
    }
}
