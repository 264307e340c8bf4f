use anyhow::{Context as _, Result};
use declarative::Ledger;
use mssqlkit::EntityState;

use crate::Context;
use crate::ui;

/// One `address  summary` line per tracked entity
pub fn lines(ledger: &Ledger<EntityState>) -> Vec<String> {
    let width = ledger.addresses().map(str::len).max().unwrap_or(0);
    ledger
        .iter()
        .map(|entry| format!("{:<width$}  {}", entry.address, entry.state.summary()))
        .collect()
}

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let state = ctx.load_state()?;

    if json {
        let output =
            serde_json::to_string_pretty(&state.ledger).context("Could not serialize state")?;
        println!("{output}");
        return Ok(());
    }

    ui::header("Tracked entities");
    ui::kv("State file", &ctx.state_path.display().to_string());
    if let Some(updated) = state.last_updated {
        ui::kv("Last updated", &updated.to_rfc3339());
    }
    println!();

    if state.ledger.is_empty() {
        ui::dim("Nothing tracked yet. Run `aclsync apply` or `aclsync import`.");
        return Ok(());
    }
    for line in lines(&state.ledger) {
        println!("  {line}");
    }
    println!();
    ui::info(&format!("{} entities tracked", state.ledger.len()));
    Ok(())
}
