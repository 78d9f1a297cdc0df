// tests.rs - End-to-end behaviour of worlds and their archetypes

use crate::{json, Entity, Query, Value, World};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn entity(value: Value) -> Entity {
    Entity::from_json(value).unwrap()
}

fn names(entities: &[Entity]) -> Vec<String> {
    entities
        .iter()
        .map(|e| e.get("name").and_then(|n| n.as_str().map(str::to_string)).unwrap_or_default())
        .collect()
}

/// Every archetype member matches its query, every matching parent member is in it.
fn assert_consistent(world: &World, archetypes: &[&crate::Bucket]) {
    for bucket in archetypes {
        let parent = bucket.parent().expect("archetypes have a parent");
        for e in world.iter() {
            let expected = parent.has(&e) && bucket.query().matches(&e.components());
            assert_eq!(bucket.has(&e), expected, "membership of {e:?} in {bucket:?}");
        }
        for e in bucket.iter() {
            assert!(parent.has(&e), "{e:?} in {bucket:?} but not in its parent");
        }
    }
}

#[test]
fn test_end_to_end_archetype_lifecycle() {
    let world = World::new();
    let john = world.add(&entity(json!({ "name": "John", "age": 30 })));
    let jane = world.add(&entity(json!({ "name": "Jane", "age": 35 })));

    let aged = world.archetype(crate::QuerySpec {
        with: vec!["age".into()],
        without: vec![],
    });
    assert_eq!(names(&aged.entities()), ["John", "Jane"]);

    world.remove_component(&john, "age");
    assert_eq!(aged.entities(), [jane.clone()]);

    world.add_component(&john, "age", 1);
    assert_eq!(aged.entities(), [jane, john]);
}

#[test]
fn test_removal_listener_sees_old_component_value() {
    let world = World::new();
    let e = world.add(&entity(json!({ "name": "John", "age": 30 })));
    let aged = world.with("age");

    let observed = Rc::new(RefCell::new(Vec::new()));
    let sink = observed.clone();
    aged.on_entity_removed(move |removed| sink.borrow_mut().push(removed.get("age")));

    world.remove_component(&e, "age");

    assert_eq!(*observed.borrow(), [Some(json!(30))]);
    assert_eq!(e.get("age"), None);
    assert!(!e.components().contains_key("age"));
}

#[test]
fn test_nested_composition() {
    let world = World::new();
    let e = world.add(&entity(json!({ "name": "John" })));
    let named_and_aged = world.with("name").with("age");
    assert!(!named_and_aged.has(&e));

    world.add_component(&e, "age", 30);
    assert!(named_and_aged.has(&e));
    assert_eq!(named_and_aged.query().required(), ["name", "age"]);
}

#[test]
fn test_nested_constraint_on_other_component_is_reevaluated() {
    let world = World::new();
    let named = world.with("name");
    let named_alive = named.without("dead");
    let e = world.add(&entity(json!({ "name": "John" })));
    assert!(named_alive.has(&e));

    // "name" membership does not change, but the grandchild depends on "dead"
    world.add_component(&e, "dead", true);
    assert!(named.has(&e));
    assert!(!named_alive.has(&e));

    world.remove_component(&e, "dead");
    assert!(named_alive.has(&e));
}

#[test]
fn test_idempotent_add_fires_once() {
    let world = World::new();
    let added = Rc::new(RefCell::new(0));
    let counter = added.clone();
    world.on_entity_added(move |_| *counter.borrow_mut() += 1);

    let e = world.add(&Entity::new());
    world.add(&e);

    assert_eq!(world.len(), 1);
    assert_eq!(*added.borrow(), 1);
}

#[test]
fn test_ids_change_after_readd() {
    let world = World::new();
    let e = world.add(&Entity::new());
    let first = world.id(&e);
    assert_eq!(world.id(&e), first);

    world.remove(&e);
    world.add(&e);
    let second = world.id(&e);
    assert!(second.is_some());
    assert_ne!(first, second);
}

#[test]
fn test_update_field_returns_same_entity() {
    let world = World::new();
    let e = world.add(&entity(json!({ "name": "John" })));
    let returned = world.update_field(&e, "name", "Jane");
    assert_eq!(returned, e);
    assert_eq!(e.get("name"), Some(json!("Jane")));
}

#[test]
fn test_removal_from_world_cascades_everywhere() {
    let world = World::new();
    let aged = world.with("age");
    let old = aged.matching(|c| c["age"].as_u64().is_some_and(|age| age > 60));
    let e = world.add(&entity(json!({ "age": 80 })));
    let id = world.id(&e).unwrap();
    assert!(old.has(&e));

    let order = Rc::new(RefCell::new(Vec::new()));
    for (label, bucket) in [("world", world.bucket()), ("aged", &aged), ("old", &old)] {
        let sink = order.clone();
        bucket.on_entity_removed(move |_| sink.borrow_mut().push(label));
    }

    world.remove(&e);

    assert_eq!(*order.borrow(), ["world", "aged", "old"]);
    assert!(!aged.has(&e) && !old.has(&e));
    assert_eq!(world.entity(id), None);
}

#[test]
fn test_reentrant_mutation_from_listener_completes_first() {
    let world = World::new();
    let aged = world.with("age");
    let tagged = world.with("tagged");

    // Whenever something gains an age, tag it.
    let handle = world.clone();
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    aged.on_entity_added(move |e| {
        sink.borrow_mut().push("aged:enter");
        handle.add_component(e, "tagged", true);
        sink.borrow_mut().push("aged:after-tag");
    });
    let sink = log.clone();
    tagged.on_entity_added(move |_| sink.borrow_mut().push("tagged:enter"));

    let e = world.add(&entity(json!({ "name": "John" })));
    world.add_component(&e, "age", 3);

    assert_eq!(*log.borrow(), ["aged:enter", "tagged:enter", "aged:after-tag"]);
    assert!(tagged.has(&e));
    assert_consistent(&world, &[&aged, &tagged]);
}

#[test]
fn test_listener_removing_entity_stops_admission_downstream() {
    let world = World::new();
    let aged = world.with("age");
    let aged_named = aged.with("name");

    let handle = world.clone();
    aged.on_entity_added(move |e| {
        handle.remove(e);
    });

    let e = world.add(&entity(json!({ "name": "John", "age": 30 })));

    assert!(!world.has(&e));
    assert!(!aged.has(&e));
    assert!(!aged_named.has(&e));
}

#[test]
fn test_listener_readding_entity_stops_removal_downstream() {
    let world = World::new();
    let aged = world.with("age");
    let aged_named = aged.with("name");

    // Put the entity straight back the first time it leaves.
    let handle = world.clone();
    let armed = Cell::new(true);
    world.on_entity_removed(move |e| {
        if armed.replace(false) {
            handle.add(e);
        }
    });

    let e = world.add(&entity(json!({ "name": "John", "age": 30 })));
    world.remove(&e);

    assert!(world.has(&e));
    assert!(aged.has(&e));
    assert!(aged_named.has(&e));
    assert!(world.id(&e).is_some());
    assert_consistent(&world, &[&aged, &aged_named]);
}

#[test]
fn test_disposing_one_shared_handle_keeps_the_other_live() {
    let world = World::new();
    let mine = world.with("age");
    let theirs = world.with("age");
    theirs.dispose();

    let e = world.add(&entity(json!({ "age": 1 })));

    assert!(mine.has(&e));
    assert!(!mine.is_disposed());
    assert!(theirs.is_disposed());
    world.remove_component(&e, "age");
    assert!(!mine.has(&e));
}

#[test]
fn test_predicate_removing_entity_while_archetype_seeds() {
    let world = World::new();
    world.add(&entity(json!({ "name": "John", "age": 30 })));
    let doomed = world.add(&entity(json!({ "name": "Jane", "age": 35 })));

    let handle = world.clone();
    let pending = RefCell::new(Some(doomed.clone()));
    let aged = world.matching(move |c| {
        let doomed = pending.borrow_mut().take();
        if let Some(doomed) = doomed {
            handle.remove(&doomed);
        }
        c.contains_key("age")
    });

    assert_eq!(names(&aged.entities()), ["John"]);
    assert!(!world.has(&doomed));
    assert_consistent(&world, &[&aged]);
}

#[test]
fn test_archetypes_stay_consistent_through_random_edits() {
    let world = World::new();
    let a = world.with("a");
    let ab = a.with("b");
    let not_c = world.without("c");
    let a_not_c = a.without("c");
    let even = world.matching(|c| c.get("n").and_then(Value::as_u64).is_some_and(|n| n % 2 == 0));

    let entities: Vec<Entity> = (0..8u64).map(|n| world.add(&entity(json!({ "n": n })))).collect();
    let fields = ["a", "b", "c"];

    // deterministic pseudo-random walk
    let mut seed = 0x2545_f491_u64;
    for step in 0..300 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let e = &entities[(seed % entities.len() as u64) as usize];
        let field = fields[((seed >> 8) % 3) as usize];
        match (seed >> 16) % 5 {
            0 => {
                world.add_component(e, field, step);
            }
            1 => {
                world.remove_component(e, field);
            }
            2 => {
                world.update_field(e, "n", step);
            }
            3 => {
                world.remove(e);
            }
            _ => {
                world.add(e);
            }
        }
        assert_consistent(&world, &[&a, &ab, &not_c, &a_not_c, &even]);
    }
}

#[test]
fn test_query_from_json_drives_archetype() {
    let world = World::new();
    let e = world.add(&entity(json!({ "position": [0, 0], "velocity": [1, 0] })));
    world.add(&entity(json!({ "position": [5, 5], "frozen": true, "velocity": [1, 1] })));

    let movers = world.archetype(
        Query::from_json_str(r#"{ "with": ["position", "velocity"], "without": ["frozen"] }"#).unwrap(),
    );
    assert_eq!(movers.entities(), [e]);
}
