//! Execution planner - refreshes tracked state and decides what to do

use crate::diff::Diff;
use crate::ledger::Ledger;
use crate::resource::{Observed, Resource};
use crate::types::Refresh;
use anyhow::{Context, Result};

/// What to do with one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Declared but never created
    Create,
    /// Tracked, but gone from the live system
    Recreate,
    /// Converge mutable attributes in place
    Update { attributes: Vec<String> },
    /// Identity attributes changed; destroy then create
    Replace { attributes: Vec<String> },
    /// Tracked but no longer declared
    Delete,
    /// Already converged
    NoChange,
}

impl Action {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }

    /// Symbol used when rendering plans
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Recreate => "!",
            Self::Update { .. } => "~",
            Self::Replace { .. } => "-/+",
            Self::Delete => "-",
            Self::NoChange => " ",
        }
    }
}

/// One entry of a plan
#[derive(Debug)]
pub struct PlannedChange<'a, R: Resource> {
    pub address: String,
    pub resource_type: &'static str,
    pub description: String,
    pub action: Action,
    /// Declaration; `None` for deletions
    pub resource: Option<&'a R>,
    /// Refreshed state; `None` when nothing exists yet
    pub state: Option<R::State>,
}

/// Decides whether a target filter names a resource type
pub type TypeMatcher = fn(filter: &str, resource_type: &str) -> bool;

/// Exact type match
pub fn default_type_matcher(filter: &str, resource_type: &str) -> bool {
    resource_type == filter
}

/// An execution plan: ordered changes plus the refreshed ledger
#[derive(Debug)]
pub struct Plan<'a, R: Resource> {
    /// Converge changes in declaration order, then deletions in reverse tracked order
    pub changes: Vec<PlannedChange<'a, R>>,
    /// Tracked state after refresh, before any change is applied
    pub refreshed: Ledger<R::State>,
    /// Declaration order of every address, used to order the ledger
    pub order: Vec<String>,
}

/// Refresh every tracked entry and plan changes for `resources`
///
/// Tracked entries that vanished from the live system are dropped from the
/// refreshed ledger; declared ones are planned for recreation.
pub fn plan<'a, R: Resource>(
    resources: &'a [R],
    ledger: &Ledger<R::State>,
    conn: &R::Conn,
) -> Result<Plan<'a, R>> {
    let mut refreshed = Ledger::new();
    let mut changes = Vec::with_capacity(resources.len());
    let order: Vec<String> = resources.iter().map(Resource::address).collect();

    for (resource, address) in resources.iter().zip(&order) {
        let (action, state) = match ledger.get(address) {
            None => (Action::Create, None),
            Some(tracked) => match refresh(address, tracked, conn)? {
                Refresh::Absent => {
                    log::warn!("{address} was removed outside of this tool");
                    (Action::Recreate, None)
                }
                Refresh::Present(state) => {
                    let action = match resource.diff(&state) {
                        Diff::NoChange => Action::NoChange,
                        Diff::Update { attributes } => Action::Update { attributes },
                        Diff::Replace { attributes } => Action::Replace { attributes },
                    };
                    refreshed.upsert(address.clone(), state.clone());
                    (action, Some(state))
                }
            },
        };

        changes.push(PlannedChange {
            address: address.clone(),
            resource_type: resource.resource_type(),
            description: resource.description(),
            action,
            resource: Some(resource),
            state,
        });
    }

    let orphans: Vec<_> = ledger
        .iter()
        .filter(|e| !order.contains(&e.address))
        .collect();
    for entry in orphans.into_iter().rev() {
        if let Some(change) = plan_delete::<R>(&entry.address, &entry.state, conn)? {
            if let Some(state) = &change.state {
                refreshed.upsert(entry.address.clone(), state.clone());
            }
            changes.push(change);
        }
    }

    refreshed.reorder(&order);
    Ok(Plan {
        changes,
        refreshed,
        order,
    })
}

/// Plan removal of every tracked entry, in reverse tracked order
pub fn plan_destroy<'a, R: Resource>(
    ledger: &Ledger<R::State>,
    conn: &R::Conn,
) -> Result<Plan<'a, R>> {
    let mut refreshed = Ledger::new();
    let mut changes = Vec::with_capacity(ledger.len());

    for entry in ledger.iter().rev() {
        if let Some(change) = plan_delete::<R>(&entry.address, &entry.state, conn)? {
            if let Some(state) = &change.state {
                refreshed.upsert(entry.address.clone(), state.clone());
            }
            changes.push(change);
        }
    }

    let order: Vec<String> = ledger.addresses().map(String::from).collect();
    refreshed.reorder(&order);
    Ok(Plan {
        changes,
        refreshed,
        order,
    })
}

fn refresh<S: Observed>(address: &str, state: &S, conn: &S::Conn) -> Result<Refresh<S>> {
    state
        .refresh(conn)
        .with_context(|| format!("Failed to refresh {address}"))
}

fn plan_delete<'a, R: Resource>(
    address: &str,
    tracked: &R::State,
    conn: &R::Conn,
) -> Result<Option<PlannedChange<'a, R>>> {
    match refresh(address, tracked, conn)? {
        Refresh::Absent => {
            log::info!("{address} is already gone, dropping it from state");
            Ok(None)
        }
        Refresh::Present(state) => Ok(Some(PlannedChange {
            address: address.to_string(),
            resource_type: state.resource_type(),
            description: state.summary(),
            action: Action::Delete,
            resource: None,
            state: Some(state),
        })),
    }
}

impl<'a, R: Resource> Plan<'a, R> {
    /// Number of changes that are not no-ops
    pub fn pending(&self) -> usize {
        self.changes.iter().filter(|c| c.action.is_change()).count()
    }

    /// Check if nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Filter plan to only include changes matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&PlannedChange<'a, R>) -> bool,
    {
        Self {
            changes: self.changes.into_iter().filter(|c| predicate(c)).collect(),
            refreshed: self.refreshed,
            order: self.order,
        }
    }

    /// Filter plan to only include changes matching a target pattern
    ///
    /// Target format: "type" or "type.label"
    pub fn filter_by_target(self, target: Option<&str>, matcher: TypeMatcher) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, label) = parse_target(t);
                self.filter(|c| matches_filter(c, resource_type, label, matcher))
            }
        }
    }
}

/// Parse a target string like "type.label" into (type, label)
fn parse_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('.') {
        Some((resource_type, label)) => (resource_type, Some(label)),
        None => (target, None),
    }
}

fn matches_filter<R: Resource>(
    change: &PlannedChange<'_, R>,
    resource_type: &str,
    label: Option<&str>,
    matcher: TypeMatcher,
) -> bool {
    if !matcher(resource_type, change.resource_type) {
        return false;
    }

    match label {
        Some(label) => change
            .address
            .split_once('.')
            .is_some_and(|(_, l)| l == label),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Setting, Store};

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("setting"), ("setting", None));
        assert_eq!(parse_target("setting.editor"), ("setting", Some("editor")));
    }

    #[test]
    fn test_plan_create_update_nochange() {
        let store = Store::default();
        let mut ledger = Ledger::new();
        let declared = vec![
            Setting::new("editor", "vim"),
            Setting::new("shell", "zsh"),
            Setting::new("theme", "dark"),
        ];
        for s in &declared[..2] {
            ledger.upsert(s.address(), s.materialize(&store).unwrap());
        }
        store.set("shell", "bash");

        let plan = plan(&declared, &ledger, &store).unwrap();
        let actions: Vec<_> = plan.changes.iter().map(|c| c.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                Action::NoChange,
                Action::Update {
                    attributes: vec!["value".into()]
                },
                Action::Create,
            ]
        );
        assert_eq!(plan.pending(), 2);
        assert_eq!(plan.refreshed.get("setting.shell").unwrap().value, "bash");
    }

    #[test]
    fn test_plan_recreate_and_orphans() {
        let store = Store::default();
        let mut ledger = Ledger::new();
        for s in [
            Setting::new("a", "1"),
            Setting::new("b", "2"),
            Setting::new("c", "3"),
            Setting::new("gone", "x"),
        ] {
            ledger.upsert(s.address(), s.materialize(&store).unwrap());
        }
        store.unset("a");
        store.unset("gone");

        let declared = vec![Setting::new("a", "1")];
        let plan = plan(&declared, &ledger, &store).unwrap();

        assert_eq!(plan.changes[0].action, Action::Recreate);
        let deletes: Vec<_> = plan.changes[1..]
            .iter()
            .map(|c| c.address.as_str())
            .collect();
        assert_eq!(deletes, vec!["setting.c", "setting.b"]);
        assert!(plan.changes[1..].iter().all(|c| c.action == Action::Delete));
        assert!(!plan.refreshed.contains("setting.a"));
        assert!(!plan.refreshed.contains("setting.gone"));
    }

    #[test]
    fn test_filter_by_target() {
        let store = Store::default();
        let declared = vec![Setting::new("editor", "vim"), Setting::new("shell", "zsh")];
        let plan = plan(&declared, &Ledger::new(), &store)
            .unwrap()
            .filter_by_target(Some("setting.shell"), default_type_matcher);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].address, "setting.shell");

        let plan = super::plan(&declared, &Ledger::new(), &store)
            .unwrap()
            .filter_by_target(Some("other"), default_type_matcher);
        assert!(plan.changes.is_empty());

        let plan = super::plan(&declared, &Ledger::new(), &store)
            .unwrap()
            .filter_by_target(Some("sett"), default_type_matcher);
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn test_plan_destroy_reverse_order() {
        let store = Store::default();
        let mut ledger = Ledger::new();
        for s in [Setting::new("a", "1"), Setting::new("b", "2")] {
            ledger.upsert(s.address(), s.materialize(&store).unwrap());
        }
        let plan: Plan<'_, Setting> = plan_destroy(&ledger, &store).unwrap();
        let order: Vec<_> = plan.changes.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(order, vec!["setting.b", "setting.a"]);
    }
}
