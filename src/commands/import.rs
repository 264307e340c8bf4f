//! Start tracking an entity that already exists on the server

use anyhow::{Context as _, Result, bail};
use declarative::Resource;
use mssqlkit::{Entity, EntityState};

use crate::Context;
use crate::commands::declarative::Conn;
use crate::state::StateFile;
use crate::ui;

/// Read the entity declared at `address` and add it to the ledger
pub fn import_entity(
    entities: &[Entity],
    state: &mut StateFile,
    catalog: &Conn,
    address: &str,
) -> Result<EntityState> {
    let entity = entities
        .iter()
        .find(|e| e.address() == address)
        .with_context(|| format!("{address} is not declared in the manifest"))?;
    if state.ledger.contains(address) {
        bail!("{address} is already tracked");
    }

    let observed = entity
        .import(catalog)
        .with_context(|| format!("Failed to import {address}"))?
        .with_context(|| format!("{} does not exist on the server", entity.description()))?;

    state.ledger.upsert(address, observed.clone());
    let order: Vec<String> = entities.iter().map(Resource::address).collect();
    state.ledger.reorder(&order);
    Ok(observed)
}

pub fn run(ctx: &Context, address: &str) -> Result<()> {
    let manifest = ctx.manifest()?;
    let entities = manifest.entities()?;
    let mut state = ctx.load_state()?;
    let catalog = ctx.catalog(&manifest)?;

    let observed = import_entity(&entities, &mut state, &catalog, address)?;
    state.save(&ctx.state_path)?;
    ui::success(&format!("Imported {address}: {}", observed.summary()));
    Ok(())
}
