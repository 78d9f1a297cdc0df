// query.rs - Archetype query specification and predicate compilation
//
// A query is the AND of three parts:
//   - every `with` component is present
//   - no `without` component is present
//   - every custom predicate returns true
//
// Queries only ever narrow. Combining two queries concatenates their parts,
// so redundant constraints are harmless.

use crate::entity::{is_present, Components};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Custom test over an entity's (possibly hypothetical) components.
pub type Predicate = Rc<dyn Fn(&Components) -> bool>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Anything that names one or more components.
pub trait ComponentNames {
    fn into_names(self) -> Vec<String>;
}

impl ComponentNames for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl ComponentNames for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl ComponentNames for &[&str] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

impl<const N: usize> ComponentNames for [&str; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

impl ComponentNames for Vec<&str> {
    fn into_names(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl ComponentNames for Vec<String> {
    fn into_names(self) -> Vec<String> {
        self
    }
}

/// Serializable, predicate-free part of a query.
///
/// ```json
/// { "with": ["position", "velocity"], "without": ["frozen"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySpec {
    pub with: Vec<String>,
    pub without: Vec<String>,
}

impl QuerySpec {
    pub fn from_json_str(source: &str) -> Result<Self, QueryError> {
        Ok(serde_json::from_str(source)?)
    }
}

/// Normalized identity of a structural query (sorted, deduplicated).
///
/// Queries carrying custom predicates have no key: closures cannot be compared.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    with: Vec<String>,
    without: Vec<String>,
}

impl QueryKey {
    pub fn with(&self) -> &[String] {
        &self.with
    }

    pub fn without(&self) -> &[String] {
        &self.without
    }
}

/// Compiled membership test for a bucket.
#[derive(Clone, Default)]
pub struct Query {
    with: Vec<String>,
    without: Vec<String>,
    predicates: Vec<Predicate>,
}

impl Query {
    /// The empty query, matching every entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the given components.
    pub fn with(mut self, names: impl ComponentNames) -> Self {
        self.with.extend(names.into_names());
        self
    }

    /// Exclude the given components.
    pub fn without(mut self, names: impl ComponentNames) -> Self {
        self.without.extend(names.into_names());
        self
    }

    /// Add a custom predicate.
    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Components) -> bool + 'static,
    {
        self.predicates.push(Rc::new(predicate));
        self
    }

    /// Logical AND of two queries.
    pub fn and(&self, other: &Query) -> Query {
        let mut combined = self.clone();
        combined.with.extend(other.with.iter().cloned());
        combined.without.extend(other.without.iter().cloned());
        combined.predicates.extend(other.predicates.iter().cloned());
        combined
    }

    /// Evaluate the query against a component map.
    pub fn matches(&self, components: &Components) -> bool {
        self.with.iter().all(|name| is_present(components, name))
            && !self.without.iter().any(|name| is_present(components, name))
            && self.predicates.iter().all(|predicate| predicate(components))
    }

    /// Whether this query matches everything.
    pub fn is_empty(&self) -> bool {
        self.with.is_empty() && self.without.is_empty() && self.predicates.is_empty()
    }

    pub fn required(&self) -> &[String] {
        &self.with
    }

    pub fn excluded(&self) -> &[String] {
        &self.without
    }

    pub fn has_predicates(&self) -> bool {
        !self.predicates.is_empty()
    }

    /// Normalized key for structural queries, `None` when a predicate is involved.
    pub fn key(&self) -> Option<QueryKey> {
        if self.has_predicates() {
            return None;
        }
        Some(QueryKey {
            with: normalize(&self.with),
            without: normalize(&self.without),
        })
    }

    /// Parse a structural query from JSON.
    pub fn from_json_str(source: &str) -> Result<Self, QueryError> {
        QuerySpec::from_json_str(source).map(Query::from)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("with", &self.with)
            .field("without", &self.without)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

impl From<QuerySpec> for Query {
    fn from(spec: QuerySpec) -> Self {
        Query::new().with(spec.with).without(spec.without)
    }
}

impl From<&str> for Query {
    fn from(name: &str) -> Self {
        Query::new().with(name)
    }
}

impl From<String> for Query {
    fn from(name: String) -> Self {
        Query::new().with(name)
    }
}

impl From<&[&str]> for Query {
    fn from(names: &[&str]) -> Self {
        Query::new().with(names)
    }
}

impl<const N: usize> From<[&str; N]> for Query {
    fn from(names: [&str; N]) -> Self {
        Query::new().with(names)
    }
}

impl From<Vec<&str>> for Query {
    fn from(names: Vec<&str>) -> Self {
        Query::new().with(names)
    }
}

impl From<Vec<String>> for Query {
    fn from(names: Vec<String>) -> Self {
        Query::new().with(names)
    }
}

fn normalize(names: &[String]) -> Vec<String> {
    let mut list = names.to_vec();
    list.sort_unstable();
    list.dedup();
    list
}
