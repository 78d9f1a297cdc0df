// bucket.rs - Reactive entity collections and the archetype DAG
//
// A bucket is an ordered set of entities plus two event channels. Buckets
// derived from another bucket ("archetypes") hold a query and a strong
// reference to their parent; the parent only keeps weak references to its
// children, so an archetype nobody holds any more simply drops out of the
// graph.
//
// Invariants (outside of an in-flight evaluate):
//   - members of a derived bucket are exactly the parent's members that match
//     its query
//   - insertion order is preserved; removal never reorders the remaining members
//
// Every cascade is depth-first and synchronous. No `RefCell` borrow is held
// across a listener call, so listeners are free to re-enter the world. A
// cascade stops walking children as soon as a listener has flipped the
// bucket's own membership back; the re-entrant call already cascaded.
//
// Structural archetypes may be shared between callers. Each handle handed
// out by a derivation is a separate claim, and `dispose` only unregisters the
// bucket once every claim has been released.

use crate::entity::{Components, Entity};
use crate::event::{Event, Subscription};
use crate::query::{ComponentNames, Query, QueryKey};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Shared handle to a reactive bucket.
///
/// Cloning the handle shares the bucket and the claim on it.
#[derive(Clone)]
pub struct Bucket {
    inner: Rc<BucketInner>,
    claim: Rc<Claim>,
}

/// One holder's stake in a bucket. Dropped unreleased claims give their
/// stake back without unregistering anything.
struct Claim {
    bucket: Weak<BucketInner>,
    released: Cell<bool>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.released.get() {
            return;
        }
        if let Some(bucket) = self.bucket.upgrade() {
            bucket.holders.set(bucket.holders.get().saturating_sub(1));
        }
    }
}

/// Non-owning handle to a [`Bucket`].
#[derive(Clone)]
pub struct WeakBucket {
    inner: Weak<BucketInner>,
}

impl WeakBucket {
    pub fn upgrade(&self) -> Option<Bucket> {
        self.inner.upgrade().map(Bucket::claim)
    }
}

struct BucketInner {
    query: Query,
    parent: Option<Rc<BucketInner>>,
    members: RefCell<Members>,
    children: RefCell<Vec<Weak<BucketInner>>>,
    shared: RefCell<HashMap<QueryKey, Weak<BucketInner>>>,
    share_archetypes: bool,
    holders: Cell<usize>,
    disposed: Cell<bool>,
    added: Event,
    removed: Event,
}

#[derive(Default)]
struct Members {
    entities: Vec<Entity>,
    positions: HashMap<Entity, usize>,
    version: u64,
}

impl Members {
    fn push(&mut self, entity: &Entity) -> bool {
        if self.positions.contains_key(entity) {
            return false;
        }
        self.positions.insert(entity.clone(), self.entities.len());
        self.entities.push(entity.clone());
        self.version += 1;
        true
    }

    fn take(&mut self, entity: &Entity) -> bool {
        let Some(index) = self.positions.remove(entity) else {
            return false;
        };
        self.entities.remove(index);
        for (position, shifted) in self.entities.iter().enumerate().skip(index) {
            self.positions.insert(shifted.clone(), position);
        }
        self.version += 1;
        true
    }
}

impl BucketInner {
    fn new(query: Query, parent: Option<Rc<BucketInner>>, share_archetypes: bool) -> Self {
        Self {
            query,
            parent,
            members: RefCell::new(Members::default()),
            children: RefCell::new(Vec::new()),
            shared: RefCell::new(HashMap::new()),
            share_archetypes,
            holders: Cell::new(0),
            disposed: Cell::new(false),
            added: Event::new(),
            removed: Event::new(),
        }
    }

    fn contains(&self, entity: &Entity) -> bool {
        self.members.borrow().positions.contains_key(entity)
    }

    /// Whether `entity` belongs here, tested against `hypothetical` when given.
    fn admits(&self, entity: &Entity, hypothetical: Option<&Components>) -> bool {
        if let Some(parent) = &self.parent {
            if !parent.contains(entity) {
                return false;
            }
        }
        match hypothetical {
            Some(components) => self.query.matches(components),
            None => self.query.matches(&entity.components()),
        }
    }

    /// Live children, pruning the ones that were dropped.
    fn live_children(&self) -> Vec<Rc<BucketInner>> {
        let mut children = self.children.borrow_mut();
        let before = children.len();
        let mut live = Vec::with_capacity(before);
        children.retain(|weak| match weak.upgrade() {
            Some(child) => {
                live.push(child);
                true
            }
            None => false,
        });
        if live.len() != before {
            self.prune_shared();
        }
        live
    }

    /// Drop cache entries whose archetype is gone.
    fn prune_shared(&self) {
        self.shared
            .borrow_mut()
            .retain(|_, weak| weak.strong_count() > 0);
    }
}

/// Re-check `entity` against `bucket` and cascade into its children.
fn evaluate(bucket: &Rc<BucketInner>, entity: &Entity, hypothetical: Option<&Components>) {
    if bucket.disposed.get() {
        return;
    }
    let was_in = bucket.contains(entity);
    let now_in = bucket.admits(entity, hypothetical);
    trace!(query = ?bucket.query, was_in, now_in, "evaluate");

    match (was_in, now_in) {
        (true, false) => evict(bucket, entity),
        (false, true) => admit(bucket, entity, hypothetical),
        (true, true) => {
            for child in bucket.live_children() {
                evaluate(&child, entity, hypothetical);
            }
        }
        (false, false) => {}
    }
}

fn admit(bucket: &Rc<BucketInner>, entity: &Entity, hypothetical: Option<&Components>) {
    let len = {
        let mut members = bucket.members.borrow_mut();
        if !members.push(entity) {
            return;
        }
        members.entities.len()
    };
    trace!(query = ?bucket.query, len, "entity added");

    bucket.added.emit(entity);

    for child in bucket.live_children() {
        if !bucket.contains(entity) {
            break;
        }
        evaluate(&child, entity, hypothetical);
    }
}

/// Remove `entity` from `bucket` and, unconditionally, from every descendant.
fn evict(bucket: &Rc<BucketInner>, entity: &Entity) {
    let len = {
        let mut members = bucket.members.borrow_mut();
        if !members.take(entity) {
            return;
        }
        members.entities.len()
    };
    trace!(query = ?bucket.query, len, "entity removed");

    bucket.removed.emit(entity);

    for child in bucket.live_children() {
        if bucket.contains(entity) {
            break;
        }
        evict(&child, entity);
    }
}

/// Create (or reuse) an archetype of `parent` for `query`.
fn derive(parent: &Rc<BucketInner>, query: Query) -> Bucket {
    let key = if parent.share_archetypes {
        query.key()
    } else {
        None
    };

    if let Some(key) = &key {
        parent.prune_shared();
        let existing = parent.shared.borrow().get(key).and_then(Weak::upgrade);
        if let Some(existing) = existing.filter(|bucket| !bucket.disposed.get()) {
            trace!(?query, holders = existing.holders.get() + 1, "reusing archetype");
            return Bucket::claim(existing);
        }
    }

    let child = Rc::new(BucketInner::new(
        query,
        Some(Rc::clone(parent)),
        parent.share_archetypes,
    ));

    // Seed from the parent's current members so the archetype is live immediately.
    let candidates = parent.members.borrow().entities.clone();
    for entity in &candidates {
        if child.admits(entity, None) {
            child.members.borrow_mut().push(entity);
        }
    }

    parent.children.borrow_mut().push(Rc::downgrade(&child));
    if let Some(key) = key {
        parent.shared.borrow_mut().insert(key, Rc::downgrade(&child));
    }

    debug!(
        query = ?child.query,
        len = child.members.borrow().entities.len(),
        "archetype created"
    );
    Bucket::claim(child)
}

impl Bucket {
    /// Create a standalone root bucket that accepts every entity.
    pub fn new() -> Self {
        Self::root(true)
    }

    pub(crate) fn root(share_archetypes: bool) -> Self {
        Self::claim(Rc::new(BucketInner::new(Query::new(), None, share_archetypes)))
    }

    /// Hand out a new handle carrying its own claim on `inner`.
    fn claim(inner: Rc<BucketInner>) -> Self {
        inner.holders.set(inner.holders.get() + 1);
        let claim = Rc::new(Claim {
            bucket: Rc::downgrade(&inner),
            released: Cell::new(false),
        });
        Self { inner, claim }
    }

    /// Add `entity` if the query admits it and it is not already a member.
    ///
    /// Fires `added`, then lets every child admit the entity too. Adding a
    /// member again is a no-op.
    pub fn add(&self, entity: &Entity) -> Entity {
        if !self.inner.disposed.get() && self.inner.admits(entity, None) {
            admit(&self.inner, entity, None);
        }
        entity.clone()
    }

    /// Remove `entity` from this bucket and every bucket derived from it.
    ///
    /// Listeners receive the entity exactly as it is now. No-op when absent.
    pub fn remove(&self, entity: &Entity) -> Entity {
        evict(&self.inner, entity);
        entity.clone()
    }

    /// Reference-identity membership test.
    pub fn has(&self, entity: &Entity) -> bool {
        self.inner.contains(entity)
    }

    /// Re-check `entity` here and in every derived bucket.
    ///
    /// When `hypothetical` is given, queries are tested against it instead of
    /// the entity's current components, while listeners still receive the real
    /// entity. Call this after mutating an entity directly to bring buckets
    /// back in sync.
    pub fn evaluate(&self, entity: &Entity, hypothetical: Option<&Components>) {
        evaluate(&self.inner, entity, hypothetical);
    }

    /// Subscribe to entities entering this bucket.
    pub fn on_entity_added<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Entity) + 'static,
    {
        self.inner.added.subscribe(listener)
    }

    /// Subscribe to entities leaving this bucket.
    pub fn on_entity_removed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Entity) + 'static,
    {
        self.inner.removed.subscribe(listener)
    }

    /// Derive an archetype holding the members that match `query` as well.
    ///
    /// # Example
    /// ```ignore
    /// let movers = world.archetype(Query::new().with(["position", "velocity"]).without("frozen"));
    /// ```
    pub fn archetype(&self, query: impl Into<Query>) -> Bucket {
        let query = self.inner.query.and(&query.into());
        derive(&self.inner, query)
    }

    /// Derive an archetype of members that have all of `names`.
    pub fn with(&self, names: impl ComponentNames) -> Bucket {
        self.archetype(Query::new().with(names))
    }

    /// Derive an archetype of members that have none of `names`.
    pub fn without(&self, names: impl ComponentNames) -> Bucket {
        self.archetype(Query::new().without(names))
    }

    /// Derive an archetype of members passing a custom test.
    pub fn matching<F>(&self, predicate: F) -> Bucket
    where
        F: Fn(&Components) -> bool + 'static,
    {
        self.archetype(Query::new().matching(predicate))
    }

    /// Release this handle's claim on the bucket.
    ///
    /// Once the last claim is released the bucket is unregistered from its
    /// parent and its listeners are dropped: it keeps its current members but
    /// stops receiving updates, and so do the buckets derived from it. While
    /// other holders of a shared archetype remain, the bucket stays live for
    /// them.
    pub fn dispose(&self) {
        if self.claim.released.replace(true) {
            return;
        }
        let holders = self.inner.holders.get().saturating_sub(1);
        self.inner.holders.set(holders);
        if holders > 0 {
            debug!(query = ?self.inner.query, holders, "released shared archetype handle");
            return;
        }
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.added.clear();
        self.inner.removed.clear();
        if let Some(parent) = &self.inner.parent {
            let me = Rc::as_ptr(&self.inner);
            parent
                .children
                .borrow_mut()
                .retain(|weak| !ptr_eq_weak(weak, me));
            parent
                .shared
                .borrow_mut()
                .retain(|_, weak| !ptr_eq_weak(weak, me));
        }
        debug!(query = ?self.inner.query, "archetype disposed");
    }

    /// Whether this handle was disposed, or the bucket itself is.
    pub fn is_disposed(&self) -> bool {
        self.claim.released.get() || self.inner.disposed.get()
    }

    /// Snapshot of the members, in order.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.members.borrow().entities.clone()
    }

    /// Iterate over a snapshot of the members. Mutating the world while
    /// iterating is fine; the iteration does not observe the changes.
    pub fn iter(&self) -> std::vec::IntoIter<Entity> {
        self.entities().into_iter()
    }

    pub fn first(&self) -> Option<Entity> {
        self.inner.members.borrow().entities.first().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.members.borrow().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.borrow().entities.is_empty()
    }

    /// Counter bumped on every membership change.
    pub fn version(&self) -> u64 {
        self.inner.members.borrow().version
    }

    pub fn query(&self) -> &Query {
        &self.inner.query
    }

    /// The bucket this one was derived from, if any.
    pub fn parent(&self) -> Option<Bucket> {
        self.inner.parent.as_ref().map(|parent| Bucket::claim(Rc::clone(parent)))
    }

    /// Number of live buckets derived directly from this one.
    pub fn child_count(&self) -> usize {
        self.inner.live_children().len()
    }

    pub fn downgrade(&self) -> WeakBucket {
        WeakBucket {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether both handles point at the same bucket.
    pub fn ptr_eq(&self, other: &Bucket) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

fn ptr_eq_weak(weak: &Weak<BucketInner>, target: *const BucketInner) -> bool {
    std::ptr::eq(weak.as_ptr(), target)
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("query", &self.inner.query)
            .field("len", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl IntoIterator for &Bucket {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
