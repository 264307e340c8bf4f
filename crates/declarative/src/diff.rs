//! Diff results and plan statistics

use crate::planner::{Action, PlannedChange};
use crate::resource::Resource;
use std::collections::BTreeMap;

/// How a declaration differs from its refreshed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    /// Already converged
    NoChange,
    /// Mutable attributes differ; converge in place
    Update { attributes: Vec<String> },
    /// Identity attributes differ; destroy and create again
    Replace { attributes: Vec<String> },
}

impl Diff {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to converge in place
    pub modifications: usize,
    /// Number of resources to destroy and recreate
    pub replacements: usize,
    /// Number of tracked resources that vanished and will be created again
    pub drifted: usize,
}

impl DiffSummary {
    /// Create a summary from planned changes
    pub fn from_changes<R: Resource>(changes: &[PlannedChange<'_, R>]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change.action {
                Action::Create => summary.additions += 1,
                Action::Recreate => summary.drifted += 1,
                Action::Update { .. } => summary.modifications += 1,
                Action::Replace { .. } => summary.replacements += 1,
                Action::Delete => summary.removals += 1,
                Action::NoChange => {}
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications + self.replacements + self.drifted
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group pending changes by resource type, skipping no-ops
pub fn group_by_type<'p, 'a, R: Resource>(
    changes: &'p [PlannedChange<'a, R>],
) -> BTreeMap<&'static str, Vec<&'p PlannedChange<'a, R>>> {
    let mut groups: BTreeMap<&'static str, Vec<&PlannedChange<'a, R>>> = BTreeMap::new();
    for change in changes.iter().filter(|c| c.action.is_change()) {
        groups.entry(change.resource_type).or_default().push(change);
    }
    groups
}
