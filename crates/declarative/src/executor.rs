//! Execution engine - applies a plan change by change and keeps the ledger current

use crate::context::{ConfirmCallback, Phase, ProgressCallback};
use crate::ledger::Ledger;
use crate::planner::{Action, Plan, PlannedChange};
use crate::resource::{Observed, Resource};
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::{Result, anyhow};

/// Result of running a plan
#[derive(Debug)]
pub struct Execution<S> {
    pub summary: ExecuteSummary,
    /// Tracked state after execution, in declaration order
    pub ledger: Ledger<S>,
}

/// Execute a plan with the given options and callbacks
///
/// Converge changes run first in declaration order, then deletions. A
/// failed change is recorded and the rest of the plan still runs unless
/// `fail_fast` is set. The returned ledger starts from the plan's refreshed
/// ledger and reflects every change that succeeded.
pub fn execute<R, P, C>(
    plan: Plan<'_, R>,
    conn: &R::Conn,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Execution<R::State>>
where
    R: Resource,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let Plan {
        changes,
        refreshed: mut ledger,
        order,
    } = plan;

    let mut summary = ExecuteSummary::default();
    let (pending, unchanged): (Vec<_>, Vec<_>) =
        changes.into_iter().partition(|c| c.action.is_change());
    summary.no_change = unchanged.len();

    if pending.is_empty() || opts.dry_run {
        return Ok(Execution { summary, ledger });
    }

    let prompt = format!("Apply {} change(s)?", pending.len());
    if !confirm.confirm(&prompt)? {
        summary.skipped = pending.len();
        return Ok(Execution { summary, ledger });
    }

    let (prune, converge): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .partition(|c| c.action == Action::Delete);

    let mut halted = false;
    for (phase, batch) in [(Phase::Converge, converge), (Phase::Prune, prune)] {
        if batch.is_empty() {
            continue;
        }

        progress.on_batch_start(batch.len(), phase);
        for change in &batch {
            let result = if halted {
                ApplyResult::Skipped {
                    reason: "an earlier change failed".into(),
                }
            } else {
                progress.on_resource_start(&change.address, &change.description);
                apply_change(change, conn, &mut ledger)
            };

            if let ApplyResult::Failed { error } = &result {
                log::error!("{}: {error}", change.address);
                halted = opts.fail_fast;
            }
            progress.on_resource_complete(&change.address, &result);
            summary.add_result(&result);
        }
        progress.on_batch_complete();
    }

    ledger.reorder(&order);
    Ok(Execution { summary, ledger })
}

/// Apply a single change, recording its outcome in the ledger
fn apply_change<R: Resource>(
    change: &PlannedChange<'_, R>,
    conn: &R::Conn,
    ledger: &mut Ledger<R::State>,
) -> ApplyResult {
    match try_apply(change, conn, ledger) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

fn try_apply<R: Resource>(
    change: &PlannedChange<'_, R>,
    conn: &R::Conn,
    ledger: &mut Ledger<R::State>,
) -> Result<ApplyResult> {
    let address = change.address.as_str();

    match &change.action {
        Action::NoChange => Ok(ApplyResult::NoChange),
        Action::Create | Action::Recreate => {
            let state = declared(change)?.materialize(conn)?;
            ledger.upsert(address, state);
            Ok(ApplyResult::Created)
        }
        Action::Update { .. } => {
            let state = converge_state(change)?;
            let state = declared(change)?.converge(state, conn)?;
            ledger.upsert(address, state);
            Ok(ApplyResult::Modified)
        }
        Action::Replace { attributes } => {
            log::info!("{address}: replacing ({})", attributes.join(", "));
            converge_state(change)?.dematerialize(conn)?;
            ledger.remove(address);
            let state = declared(change)?.materialize(conn)?;
            ledger.upsert(address, state);
            Ok(ApplyResult::Replaced)
        }
        Action::Delete => {
            converge_state(change)?.dematerialize(conn)?;
            ledger.remove(address);
            Ok(ApplyResult::Removed)
        }
    }
}

fn declared<'a, R: Resource>(change: &PlannedChange<'a, R>) -> Result<&'a R> {
    change
        .resource
        .ok_or_else(|| anyhow!("{} has no declaration", change.address))
}

fn converge_state<'c, R: Resource>(change: &'c PlannedChange<'_, R>) -> Result<&'c R::State> {
    change
        .state
        .as_ref()
        .ok_or_else(|| anyhow!("{} has no tracked state", change.address))
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple<R: Resource>(
    plan: Plan<'_, R>,
    conn: &R::Conn,
    opts: &ExecuteOptions,
) -> Result<Execution<R::State>> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, conn, opts, &mut NoProgress, &mut AutoConfirm)
}
