// identity.rs - Lazily assigned numeric ids for tracked entities
//
// Ids are handed out from a counter that only ever grows. An entity gets an id
// the first time one is requested while it is tracked, and loses it when it
// leaves the world. Dropped ids are never handed out again.

use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable numeric id of a tracked entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two-way entity ⇄ id mapping owned by a single world.
#[derive(Debug)]
pub(crate) struct IdentityTable {
    next_id: u64,
    by_entity: HashMap<Entity, EntityId>,
    by_id: HashMap<EntityId, Entity>,
}

impl IdentityTable {
    pub fn new(first_id: u64) -> Self {
        Self {
            next_id: first_id,
            by_entity: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    /// Return the entity's id, assigning the next one on first request.
    pub fn id_of(&mut self, entity: &Entity) -> EntityId {
        if let Some(&id) = self.by_entity.get(entity) {
            return id;
        }
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.by_entity.insert(entity.clone(), id);
        self.by_id.insert(id, entity.clone());
        tracing::debug!(%id, "assigned entity id");
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.by_id.get(&id).cloned()
    }

    /// Purge both mappings for `entity`.
    pub fn forget(&mut self, entity: &Entity) -> Option<EntityId> {
        let id = self.by_entity.remove(entity)?;
        self.by_id.remove(&id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.by_entity.len()
    }
}
