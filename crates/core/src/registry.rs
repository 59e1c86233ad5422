//! Query registry.
//!
//! Envelopes carry a query reference by name. On the consuming side the name
//! must map back to a query the client knows about; `QueryRegistry` holds that
//! mapping and fails fast when a name is unknown.

use crate::error::{Error, Result};
use crate::query::QueryRef;
use hashbrown::HashMap;

/// Maps serialized reference names back to query references.
#[derive(Clone, Debug, Default)]
pub struct QueryRegistry {
    /// Name -> reference
    queries: HashMap<String, QueryRef>,
}

impl QueryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            queries: HashMap::new(),
        }
    }

    /// Creates a registry pre-populated with the given names.
    pub fn with_queries<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(name);
        }
        registry
    }

    /// Registers a query name and returns its reference.
    ///
    /// Registering the same name twice returns the existing reference.
    pub fn register(&mut self, name: impl AsRef<str>) -> QueryRef {
        let name = name.as_ref();
        if let Some(existing) = self.queries.get(name) {
            return existing.clone();
        }
        let query = QueryRef::new(name);
        self.queries.insert(String::from(name), query.clone());
        query
    }

    /// Resolves a serialized name.
    pub fn resolve(&self, name: &str) -> Result<QueryRef> {
        self.queries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_query(name))
    }

    /// Returns true if the name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.queries.contains_key(name)
    }

    /// Returns the number of registered queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
