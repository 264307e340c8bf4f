//! Declarative commands
//!
//! - `plan` - refresh tracked entities and show what apply would change
//! - `apply` - converge the server to the manifest
//! - `refresh` - re-read tracked entities only
//! - `destroy` - drop tracked entities in reverse order

use anyhow::{Context as _, Result, bail};
use declarative::{
    Action, ConfirmCallback, ExecuteOptions, ExecuteSummary, Execution, Ledger, Plan,
    ProgressCallback, Resource, execute, plan_destroy,
};
use mssqlkit::{Entity, EntityKind, EntityState};

use crate::Context;
use crate::cli::{ApplyArgs, DestroyArgs};
use crate::engine::differ;
use crate::engine::progress::{BarProgress, PromptConfirm};
use crate::state::StateFile;
use crate::ui;

/// Connection handle the entity lifecycles run against
pub type Conn = <Entity as Resource>::Conn;

// ============================================================================
// Core operations
// ============================================================================

/// Whether a `kind` or `kind.label` target selects an entry
pub fn selected(target: Option<&str>, address: &str, resource_type: &str) -> bool {
    let Some(target) = target else {
        return true;
    };
    let (filter, label) = match target.split_once('.') {
        Some((filter, label)) => (filter, Some(label)),
        None => (target, None),
    };
    EntityKind::matches_filter(filter, resource_type)
        && label.is_none_or(|label| {
            address
                .split_once('.')
                .is_some_and(|(_, l)| l == label)
        })
}

/// Refresh the ledger and plan changes for the declared entities
pub fn preview<'a>(
    entities: &'a [Entity],
    state: &StateFile,
    catalog: &Conn,
    target: Option<&str>,
) -> Result<Plan<'a, Entity>> {
    Ok(declarative::plan(entities, &state.ledger, catalog)?
        .filter_by_target(target, EntityKind::matches_filter))
}

/// Plan removal of tracked entities
pub fn preview_destroy<'a>(
    state: &StateFile,
    catalog: &Conn,
    target: Option<&str>,
) -> Result<Plan<'a, Entity>> {
    Ok(plan_destroy::<Entity>(&state.ledger, catalog)?
        .filter_by_target(target, EntityKind::matches_filter))
}

/// Execute a plan and adopt the resulting ledger unless this is a dry run
pub fn run<P, C>(
    plan: Plan<'_, Entity>,
    catalog: &Conn,
    state: &mut StateFile,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let Execution { summary, ledger } = execute(plan, catalog, opts, progress, confirm)?;
    if !opts.dry_run {
        state.ledger = ledger;
    }
    Ok(summary)
}

/// Outcome of re-reading tracked entities
#[derive(Debug, Default)]
pub struct Refreshed {
    pub ledger: Ledger<EntityState>,
    /// Still present but read back differently
    pub drifted: Vec<String>,
    /// Gone from the server; no longer tracked
    pub vanished: Vec<String>,
}

/// Re-read every selected entry; untargeted entries are kept as they are
pub fn refresh_ledger(
    ledger: &Ledger<EntityState>,
    catalog: &Conn,
    target: Option<&str>,
) -> Result<Refreshed> {
    let mut refreshed = Refreshed::default();

    for entry in ledger.iter() {
        if !selected(target, &entry.address, entry.state.kind().as_str()) {
            refreshed
                .ledger
                .upsert(entry.address.clone(), entry.state.clone());
            continue;
        }

        let observed = entry
            .state
            .refresh(catalog)
            .with_context(|| format!("Failed to refresh {}", entry.address))?;
        match observed {
            Some(state) => {
                if state != entry.state {
                    log::info!("{} changed outside of aclsync", entry.address);
                    refreshed.drifted.push(entry.address.clone());
                }
                refreshed.ledger.upsert(entry.address.clone(), state);
            }
            None => {
                log::warn!("{} was removed outside of aclsync", entry.address);
                refreshed.vanished.push(entry.address.clone());
            }
        }
    }

    Ok(refreshed)
}

// ============================================================================
// Commands
// ============================================================================

pub fn plan(ctx: &Context, target: Option<&str>) -> Result<()> {
    let manifest = ctx.manifest()?;
    let entities = manifest.entities()?;
    let state = ctx.load_state()?;
    let catalog = ctx.catalog(&manifest)?;

    let plan = preview(&entities, &state, &catalog, target)?;
    differ::display_plan(&plan.changes);

    if ctx.verbose > 0 {
        for change in plan.changes.iter().filter(|c| c.action == Action::NoChange) {
            ui::dim(&format!("{} (unchanged)", change.address));
        }
    }
    Ok(())
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let manifest = ctx.manifest()?;
    let entities = manifest.entities()?;
    let mut state = ctx.load_state()?;
    let catalog = ctx.catalog(&manifest)?;

    let plan = preview(&entities, &state, &catalog, args.target.as_deref())?;
    if !ctx.quiet {
        differ::display_plan(&plan.changes);
    }
    let pending = plan.pending();

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        fail_fast: args.fail_fast,
    };
    let summary = run(
        plan,
        &catalog,
        &mut state,
        &opts,
        &mut BarProgress::new(ctx.quiet),
        &mut PromptConfirm { yes: args.yes },
    )?;

    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    state.save(&ctx.state_path)?;
    if pending > 0 {
        differ::print_summary(&summary, "applied");
    }
    if !summary.is_success() {
        bail!("{} change(s) failed", summary.failed);
    }
    Ok(())
}

pub fn refresh(ctx: &Context, target: Option<&str>) -> Result<()> {
    let manifest = ctx.manifest()?;
    let mut state = ctx.load_state()?;
    let catalog = ctx.catalog(&manifest)?;

    let Refreshed {
        ledger,
        drifted,
        vanished,
    } = refresh_ledger(&state.ledger, &catalog, target)?;

    for address in &drifted {
        ui::warn(&format!("{address} changed outside of aclsync"));
    }
    for address in &vanished {
        ui::warn(&format!("{address} no longer exists and is no longer tracked"));
    }

    state.ledger = ledger;
    state.save(&ctx.state_path)?;
    ui::success(&format!(
        "Refreshed {} tracked entities ({} drifted, {} removed)",
        state.ledger.len(),
        drifted.len(),
        vanished.len()
    ));
    Ok(())
}

pub fn destroy(ctx: &Context, args: &DestroyArgs) -> Result<()> {
    let manifest = ctx.manifest()?;
    let mut state = ctx.load_state()?;
    let catalog = ctx.catalog(&manifest)?;

    let plan = preview_destroy(&state, &catalog, args.target.as_deref())?;
    if plan.is_empty() {
        ui::info("Nothing is tracked");
        return Ok(());
    }
    differ::display_plan(&plan.changes);
    ui::warn("Destroy drops these entities from the server");

    let summary = run(
        plan,
        &catalog,
        &mut state,
        &ExecuteOptions::default(),
        &mut BarProgress::new(ctx.quiet),
        &mut PromptConfirm { yes: args.yes },
    )?;

    state.save(&ctx.state_path)?;
    differ::print_summary(&summary, "destroyed");
    if !summary.is_success() {
        bail!("{} change(s) failed", summary.failed);
    }
    Ok(())
}
