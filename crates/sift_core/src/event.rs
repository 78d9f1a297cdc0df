//! Synchronous event channels for bucket membership changes.
//!
//! Emitting calls every listener directly, in registration order, before
//! returning. Listeners may subscribe, unsubscribe or mutate the world while an
//! emit is in flight: the emit walks a snapshot of the listener list and skips
//! any listener that was unsubscribed after the snapshot was taken.

use crate::entity::Entity;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Listener = Rc<dyn Fn(&Entity)>;
type ListenerList = RefCell<Vec<(u64, Listener)>>;

/// A channel carrying entities to its listeners.
#[derive(Default)]
pub struct Event {
    listeners: Rc<ListenerList>,
    next_id: Cell<u64>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Keep the returned handle to unsubscribe later.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Entity) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let listener: Listener = Rc::new(listener);
        self.listeners.borrow_mut().push((id, listener));
        Subscription {
            listeners: Rc::downgrade(&self.listeners),
            id,
        }
    }

    /// Invoke every listener with `entity`.
    pub fn emit(&self, entity: &Entity) {
        let snapshot: Vec<(u64, Listener)> = self.listeners.borrow().clone();
        for (id, listener) in snapshot {
            if self.is_subscribed(id) {
                listener(entity);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.listeners.borrow().iter().any(|(other, _)| *other == id)
    }
}

/// Unsubscribe capability returned by [`Event::subscribe`].
///
/// Dropping the handle leaves the listener registered.
#[derive(Debug)]
pub struct Subscription {
    listeners: Weak<ListenerList>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.listeners
            .upgrade()
            .is_some_and(|listeners| listeners.borrow().iter().any(|(id, _)| *id == self.id))
    }
}
