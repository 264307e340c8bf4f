//! Plan and summary display

use colored::{ColoredString, Colorize};
use declarative::{Action, DiffSummary, ExecuteSummary, PlannedChange, group_by_type};
use mssqlkit::Entity;

fn type_name(resource_type: &str) -> &str {
    match resource_type {
        "database" => "Databases",
        "sql_login" => "Logins",
        "server_role" => "Server roles",
        "server_role_member" => "Server role members",
        "server_permission" => "Server permissions",
        "database_role" => "Database roles",
        "sql_user" => "Users (SQL)",
        "external_user" => "Users (external)",
        "service_principal" => "Service principals",
        "schema" => "Schemas",
        "database_role_member" => "Database role members",
        "database_permission" => "Database permissions",
        "schema_permission" => "Schema permissions",
        _ => resource_type,
    }
}

fn symbol(action: &Action) -> ColoredString {
    let symbol = action.symbol();
    match action {
        Action::Create => symbol.green(),
        Action::Recreate => symbol.magenta(),
        Action::Update { .. } => symbol.yellow(),
        Action::Replace { .. } => symbol.yellow().bold(),
        Action::Delete => symbol.red(),
        Action::NoChange => symbol.dimmed(),
    }
}

/// What is changing, for the right-hand column
pub fn detail(change: &PlannedChange<'_, Entity>) -> String {
    match &change.action {
        Action::Update { attributes } => {
            format!("{} ({})", change.description, attributes.join(", "))
        }
        Action::Replace { attributes } => format!(
            "{} (forces replacement: {})",
            change.description,
            attributes.join(", ")
        ),
        Action::Recreate => format!("{} (removed outside aclsync)", change.description),
        _ => change.description.clone(),
    }
}

/// Display pending changes grouped by entity kind
pub fn display_plan(changes: &[PlannedChange<'_, Entity>]) {
    let summary = DiffSummary::from_changes(changes);
    if !summary.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Access Control Plan".bold()
    );
    println!("│");

    for (resource_type, type_changes) in group_by_type(changes) {
        println!("│ {}", type_name(resource_type).bold());
        for change in type_changes {
            println!(
                "│   {:<3} {:<40} {}",
                symbol(&change.action),
                change.address,
                detail(change).dimmed()
            );
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to add, {} to change, {} to replace, {} to remove",
        (summary.additions + summary.drifted).to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.replacements.to_string().yellow(),
        summary.removals.to_string().red()
    );
    if summary.drifted > 0 {
        println!(
            "│ {} {} tracked entities were removed outside aclsync",
            "⚠".yellow(),
            summary.drifted
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}

pub fn print_summary(summary: &ExecuteSummary, verb: &str) {
    println!();
    if summary.is_success() {
        println!("  {} Access control {verb} successfully!", "✓".green().bold());
    } else {
        println!("  {} Access control {verb} with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} entities created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} entities updated", summary.modified);
    }
    if summary.replaced > 0 {
        println!("    • {} entities replaced", summary.replaced);
    }
    if summary.removed > 0 {
        println!("    • {} entities removed", summary.removed);
    }
    if summary.no_change > 0 {
        println!("    • {} entities unchanged", summary.no_change.to_string().dimmed());
    }
    if summary.skipped > 0 {
        println!("    • {} entities skipped", summary.skipped.to_string().yellow());
    }
    if summary.failed > 0 {
        println!("    • {} entities failed", summary.failed.to_string().red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssqlkit::EntitySpec;
    use mssqlkit::entity::DatabaseSpec;

    fn change(action: Action) -> PlannedChange<'static, Entity> {
        PlannedChange {
            address: "database.app".into(),
            resource_type: "database",
            description: "database app".into(),
            action,
            resource: None,
            state: None,
        }
    }

    #[test]
    fn test_detail_names_attributes() {
        let update = change(Action::Update {
            attributes: vec!["owner".into(), "roles".into()],
        });
        assert_eq!(detail(&update), "database app (owner, roles)");

        let replace = change(Action::Replace {
            attributes: vec!["name".into()],
        });
        assert_eq!(detail(&replace), "database app (forces replacement: name)");
        assert_eq!(detail(&change(Action::Create)), "database app");
    }

    #[test]
    fn test_every_kind_has_a_heading() {
        for kind in mssqlkit::EntityKind::ALL {
            assert_ne!(type_name(kind.as_str()), kind.as_str());
        }
        let entity = Entity::new(
            "app",
            EntitySpec::Database(DatabaseSpec { name: "app".into() }),
        );
        assert_eq!(type_name(entity.kind().as_str()), "Databases");
    }
}
