// entity.rs - Reference-identified, open-shaped records
//
// An entity is a shared handle to a JSON object map. Two handles are the same
// entity iff they point at the same map; component values never take part in
// equality or hashing.
//
// A component is present iff its value is not `null`. Writing `null` to a
// component is indistinguishable from never having set it.

use serde_json::{Map, Value};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::rc::Rc;
use thiserror::Error;

/// Component name → value storage backing every entity.
pub type Components = Map<String, Value>;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("an entity must be built from a JSON object, got {kind}")]
    NotAnObject { kind: &'static str },
}

/// Whether `name` is present in `components` under the `null`-is-absent rule.
#[inline]
pub fn is_present(components: &Components, name: &str) -> bool {
    components.get(name).is_some_and(|value| !value.is_null())
}

/// Shared handle to a mutable component map.
///
/// Cloning the handle does not copy the components. The setters on this type
/// write straight to the map and do not reindex anything; go through
/// [`World`](crate::World) (or call [`Bucket::evaluate`](crate::Bucket::evaluate)
/// afterwards) to keep derived buckets in sync.
#[derive(Clone, Default)]
pub struct Entity(Rc<RefCell<Components>>);

impl Entity {
    /// Create an entity without components.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_components(components: Components) -> Self {
        Self(Rc::new(RefCell::new(components)))
    }

    /// Build an entity from a JSON object.
    ///
    /// # Example
    /// ```ignore
    /// let john = Entity::from_json(json!({ "name": "John", "age": 30 }))?;
    /// ```
    pub fn from_json(value: Value) -> Result<Self, EntityError> {
        match value {
            Value::Object(components) => Ok(Self::from_components(components)),
            other => Err(EntityError::NotAnObject {
                kind: json_kind(&other),
            }),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        is_present(&self.0.borrow(), name)
    }

    /// Clone out a component value. `None` when the component is absent.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0
            .borrow()
            .get(name)
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// Write a component directly, bypassing reindexing.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.borrow_mut().insert(name.into(), value.into());
    }

    /// Physically delete a component, bypassing reindexing.
    pub fn delete(&self, name: &str) -> Option<Value> {
        self.0.borrow_mut().remove(name)
    }

    /// Merge a partial record into this entity, field by field.
    pub fn merge(&self, partial: Components) {
        let mut components = self.0.borrow_mut();
        for (name, value) in partial {
            components.insert(name, value);
        }
    }

    /// Shallow copy of the current components, detached from this entity.
    pub fn snapshot(&self) -> Components {
        self.0.borrow().clone()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.snapshot())
    }

    /// Names of the components currently present, in storage order.
    pub fn component_names(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Borrow the component map.
    ///
    /// # Panics
    /// Panics if the map is currently borrowed mutably (e.g. from inside an
    /// `update_with` closure).
    pub fn components(&self) -> Ref<'_, Components> {
        self.0.borrow()
    }

    pub(crate) fn components_mut(&self) -> RefMut<'_, Components> {
        self.0.borrow_mut()
    }

    /// Identity comparison, same as `==`.
    #[inline]
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(components) => f.debug_tuple("Entity").field(&*components).finish(),
            Err(_) => f.write_str("Entity(<borrowed>)"),
        }
    }
}

impl From<Components> for Entity {
    fn from(components: Components) -> Self {
        Self::from_components(components)
    }
}

impl TryFrom<Value> for Entity {
    type Error = EntityError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
