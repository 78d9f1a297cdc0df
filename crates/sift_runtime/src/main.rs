//! Sift Runtime
//!
//! Small binary that boots logging, loads an optional world config and replays
//! a scripted scenario, logging every archetype event it triggers.
//!
//! Usage: `sift [config.json]`. Set `RUST_LOG=sift_core=trace` to watch the
//! reindexing cascade itself.

use anyhow::{Context, Result};
use serde_json::json;
use sift_core::{Entity, World, WorldConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Sift v{}", sift_core::VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => WorldConfig::load(&path)
            .with_context(|| format!("failed to load world config from {path}"))?,
        None => WorldConfig::default(),
    };
    tracing::info!(?config, "world config");

    let world = World::with_config(config);
    let aged = world.with("age");
    let adults = aged.matching(|c| c["age"].as_u64().is_some_and(|age| age >= 18));

    let handle = world.downgrade();
    aged.on_entity_added(move |e| {
        let id = handle.upgrade().and_then(|world| world.id(e));
        tracing::info!(?id, name = ?e.get("name"), "entered `age`");
    });
    aged.on_entity_removed(|e| {
        // Still carries the component whose removal caused this event.
        tracing::info!(name = ?e.get("name"), age = ?e.get("age"), "left `age`");
    });
    adults.on_entity_added(|e| tracing::info!(name = ?e.get("name"), "entered `adults`"));
    adults.on_entity_removed(|e| tracing::info!(name = ?e.get("name"), "left `adults`"));

    let john = world.add(&Entity::from_json(json!({ "name": "John", "age": 30 }))?);
    let jane = world.add(&Entity::from_json(json!({ "name": "Jane", "age": 35 }))?);
    let kid = world.add(&Entity::from_json(json!({ "name": "Timmy" }))?);

    world.add_component(&kid, "age", 9);
    world.remove_component(&john, "age");
    world.add_component(&john, "age", 1);
    world.update_field(&kid, "age", 18);
    world.remove(&jane);

    let members: Vec<_> = aged.iter().filter_map(|e| e.get("name")).collect();
    tracing::info!(?members, adults = adults.len(), total = world.len(), "final state");

    Ok(())
}
