// world.rs - Root bucket with entity lifecycle and identity management
//
// The world is the single source of truth. Every mutation that can change an
// entity's shape goes through here and ends with an evaluate on the root
// bucket, which cascades through every derived archetype before returning.

use crate::bucket::{Bucket, WeakBucket};
use crate::config::WorldConfig;
use crate::entity::{Components, Entity};
use crate::identity::{EntityId, IdentityTable};
use serde_json::Value;
use std::cell::RefCell;
use std::ops::Deref;
use std::rc::{Rc, Weak};
use tracing::trace;

/// The root bucket of a DAG of archetypes, plus entity lifecycle operations.
///
/// `World` is a cheap handle: clones share the same entities, archetypes and
/// identity table, so listeners can capture a clone to mutate the world
/// re-entrantly. Everything else a bucket offers (`has`, `entities`, `with`,
/// `without`, `archetype`, event subscriptions) is reachable through `Deref`.
///
/// # Example
/// ```ignore
/// let world = World::new();
/// let aged = world.with("age");
/// let john = world.add(&Entity::from_json(json!({ "name": "John" }))?);
///
/// world.add_component(&john, "age", 30);
/// assert!(aged.has(&john));
/// ```
#[derive(Clone)]
pub struct World {
    root: Bucket,
    ids: Rc<RefCell<IdentityTable>>,
}

/// Non-owning handle to a [`World`], for listeners registered on the world itself.
#[derive(Clone)]
pub struct WeakWorld {
    root: WeakBucket,
    ids: Weak<RefCell<IdentityTable>>,
}

impl WeakWorld {
    pub fn upgrade(&self) -> Option<World> {
        Some(World {
            root: self.root.upgrade()?,
            ids: self.ids.upgrade()?,
        })
    }
}

impl World {
    /// Create an empty world with the default configuration.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let root = Bucket::root(config.share_archetypes);
        let ids = Rc::new(RefCell::new(IdentityTable::new(config.first_id)));

        // Purge identity entries as soon as an entity leaves the world.
        let table = Rc::downgrade(&ids);
        root.on_entity_removed(move |entity| {
            if let Some(table) = table.upgrade() {
                let mut table = table.borrow_mut();
                if let Some(id) = table.forget(entity) {
                    trace!(%id, remaining = table.len(), "released entity id");
                }
            }
        });

        Self { root, ids }
    }

    /// Start tracking `entity`. Archetypes that match it admit it before this
    /// returns. Adding a tracked entity again is a no-op.
    pub fn add(&self, entity: &Entity) -> Entity {
        self.root.add(entity)
    }

    /// Stop tracking `entity`, evicting it from every archetype and releasing its id.
    pub fn remove(&self, entity: &Entity) -> Entity {
        self.root.remove(entity)
    }

    /// Remove every tracked entity. The id counter keeps counting.
    pub fn clear(&self) {
        for entity in self.root.entities().iter().rev() {
            self.root.remove(entity);
        }
    }

    /// Reindex `entity` after it was mutated directly.
    pub fn update(&self, entity: &Entity) -> Entity {
        self.reindex(entity);
        entity.clone()
    }

    /// Merge `partial` into `entity`, then reindex.
    pub fn update_partial(&self, entity: &Entity, partial: Components) -> Entity {
        entity.merge(partial);
        self.reindex(entity);
        entity.clone()
    }

    /// Let `f` mutate the components in place; whatever partial record it
    /// returns is merged afterwards. Reindexes once at the end.
    ///
    /// The components are borrowed mutably while `f` runs, so `f` must not
    /// touch `entity` through another handle.
    pub fn update_with<F>(&self, entity: &Entity, f: F) -> Entity
    where
        F: FnOnce(&mut Components) -> Option<Components>,
    {
        let partial = f(&mut entity.components_mut());
        if let Some(partial) = partial {
            entity.merge(partial);
        }
        self.reindex(entity);
        entity.clone()
    }

    /// Set a single component, then reindex.
    pub fn update_field(
        &self,
        entity: &Entity,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Entity {
        entity.set(name, value);
        self.reindex(entity);
        entity.clone()
    }

    /// Add a component if it is not present yet. Returns whether it was added.
    pub fn add_component(
        &self,
        entity: &Entity,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> bool {
        let name = name.into();
        if entity.has(&name) {
            return false;
        }
        entity.set(name, value);
        self.reindex(entity);
        true
    }

    /// Remove a component if present, returning its value.
    ///
    /// Archetypes are re-evaluated against the entity as it will look without
    /// the component *before* the component is deleted, so removal listeners
    /// still observe the old value.
    pub fn remove_component(&self, entity: &Entity, name: &str) -> Option<Value> {
        if !entity.has(name) {
            return None;
        }
        if self.root.has(entity) {
            let mut future = entity.snapshot();
            future.remove(name);
            self.root.evaluate(entity, Some(&future));
        }
        entity.delete(name)
    }

    /// The id of a tracked entity, assigned on first request.
    pub fn id(&self, entity: &Entity) -> Option<EntityId> {
        if !self.root.has(entity) {
            return None;
        }
        Some(self.ids.borrow_mut().id_of(entity))
    }

    /// Reverse id lookup.
    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.ids.borrow().entity(id)
    }

    /// The root bucket.
    pub fn bucket(&self) -> &Bucket {
        &self.root
    }

    pub fn downgrade(&self) -> WeakWorld {
        WeakWorld {
            root: self.root.downgrade(),
            ids: Rc::downgrade(&self.ids),
        }
    }

    fn reindex(&self, entity: &Entity) {
        if self.root.has(entity) {
            self.root.evaluate(entity, None);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for World {
    type Target = Bucket;

    fn deref(&self) -> &Bucket {
        &self.root
    }
}
