//! Sift Core
//!
//! Reactive archetype indexing for schemaless entities:
//! - Entities as reference-identified component maps
//! - Buckets that keep ordered membership and fire add/remove events
//! - Archetype queries (`with` / `without` / custom predicates) derived from buckets
//! - The `World`, which owns entity lifecycles and drives reindexing

pub mod bucket;
pub mod config;
pub mod entity;
pub mod event;
pub mod identity;
pub mod query;
pub mod world;

#[cfg(test)]
mod tests;

pub use bucket::{Bucket, WeakBucket};
pub use config::{ConfigError, WorldConfig};
pub use entity::{Components, Entity, EntityError};
pub use event::{Event, Subscription};
pub use identity::EntityId;
pub use query::{ComponentNames, Predicate, Query, QueryError, QueryKey, QuerySpec};
pub use world::{WeakWorld, World};

/// Re-exported so callers can build components without naming serde_json themselves.
pub use serde_json::{json, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
