//! Role membership differ.

use crate::command::Command;
use crate::types::RoleScope;
use std::collections::BTreeSet;

/// Roles to join and leave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

/// `to_add = desired - observed`, `to_remove = observed - desired`.
pub fn diff(desired: &BTreeSet<String>, observed: &BTreeSet<String>) -> MembershipDelta {
    MembershipDelta {
        to_add: desired.difference(observed).cloned().collect(),
        to_remove: observed.difference(desired).cloned().collect(),
    }
}

impl MembershipDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Statements for `member`: every addition before any removal.
    pub fn commands(&self, scope: &RoleScope, member: &str) -> Vec<Command> {
        let adds = self.to_add.iter().map(|role| Command::AddRoleMember {
            scope: scope.clone(),
            role: role.clone(),
            member: member.to_string(),
        });
        let removes = self.to_remove.iter().map(|role| Command::DropRoleMember {
            scope: scope.clone(),
            role: role.clone(),
            member: member.to_string(),
        });
        adds.chain(removes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_diff_properties() {
        let desired = set(&["db_datareader", "reporting"]);
        let observed = set(&["db_datawriter", "reporting"]);
        let delta = diff(&desired, &observed);

        assert_eq!(delta.to_add, set(&["db_datareader"]));
        assert_eq!(delta.to_remove, set(&["db_datawriter"]));
        assert!(delta.to_add.is_disjoint(&observed));
        assert!(delta.to_remove.is_disjoint(&desired));

        let converged: BTreeSet<String> = observed
            .union(&delta.to_add)
            .filter(|r| !delta.to_remove.contains(*r))
            .cloned()
            .collect();
        assert_eq!(converged, desired);
    }

    #[test]
    fn test_equal_sets_are_empty() {
        let roles = set(&["a", "b"]);
        assert!(diff(&roles, &roles).is_empty());
        assert!(diff(&BTreeSet::new(), &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_commands_add_before_remove() {
        let delta = diff(&set(&["z_new", "a_new"]), &set(&["b_old"]));
        let sql: Vec<String> = delta
            .commands(&RoleScope::Database("app".into()), "alice")
            .iter()
            .map(Command::to_sql)
            .collect();
        assert_eq!(
            sql,
            vec![
                "ALTER ROLE [a_new] ADD MEMBER [alice]",
                "ALTER ROLE [z_new] ADD MEMBER [alice]",
                "ALTER ROLE [b_old] DROP MEMBER [alice]",
            ]
        );
    }

    #[test]
    fn test_server_scope_keyword() {
        let delta = diff(&set(&["sysadmin"]), &BTreeSet::new());
        let commands = delta.commands(&RoleScope::Server, "ops");
        assert_eq!(
            commands[0].to_sql(),
            "ALTER SERVER ROLE [sysadmin] ADD MEMBER [ops]"
        );
    }
}
