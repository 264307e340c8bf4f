//! Permission differ.
//!
//! Compares one desired grant against what the engine shows and decides the
//! single action that converges them.

use crate::command::{Command, Permission};
use crate::ownership::ObservedGrant;
use crate::types::ScopeLocator;
use serde::{Deserialize, Serialize};

/// A grant the caller wants to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredPermission {
    pub name: Permission,
    #[serde(default)]
    pub with_grant_option: bool,
}

/// What to do about one (principal, permission, scope) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionAction {
    NoOp,
    Grant { with_grant_option: bool },
    Revoke { cascade: bool },
    /// Grant option differs; the engine cannot downgrade in place
    RevokeThenGrant { cascade: bool, with_grant_option: bool },
}

/// Whether revokes on `scope` carry `CASCADE`.
///
/// Schema revokes cascade so dependent grants made with the grant option
/// go too; database and server revokes do not.
pub fn revoke_cascades(scope: &ScopeLocator) -> bool {
    matches!(scope, ScopeLocator::Schema { .. })
}

/// Decide the action for one grant.
pub fn diff(
    scope: &ScopeLocator,
    desired: Option<&DesiredPermission>,
    observed: Option<&ObservedGrant>,
) -> PermissionAction {
    let cascade = revoke_cascades(scope);

    match (desired, observed) {
        // Owner-implied grants can neither be revoked nor re-granted
        (_, Some(ObservedGrant::Implied { .. })) | (None, None) => PermissionAction::NoOp,
        (Some(want), None) => PermissionAction::Grant {
            with_grant_option: want.with_grant_option,
        },
        (None, Some(ObservedGrant::Explicit(_))) => PermissionAction::Revoke { cascade },
        (Some(want), Some(ObservedGrant::Explicit(row))) => {
            if want.with_grant_option == row.with_grant_option {
                PermissionAction::NoOp
            } else {
                PermissionAction::RevokeThenGrant {
                    cascade,
                    with_grant_option: want.with_grant_option,
                }
            }
        }
    }
}

impl PermissionAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    /// Statements implementing this action.
    pub fn commands(
        &self,
        scope: &ScopeLocator,
        principal: &str,
        permission: &Permission,
    ) -> Vec<Command> {
        let grant = |with_grant_option| Command::Grant {
            scope: scope.clone(),
            permission: permission.clone(),
            principal: principal.to_string(),
            with_grant_option,
        };
        let revoke = |cascade| Command::Revoke {
            scope: scope.clone(),
            permission: permission.clone(),
            principal: principal.to_string(),
            cascade,
        };

        match *self {
            Self::NoOp => Vec::new(),
            Self::Grant { with_grant_option } => vec![grant(with_grant_option)],
            Self::Revoke { cascade } => vec![revoke(cascade)],
            Self::RevokeThenGrant {
                cascade,
                with_grant_option,
            } => vec![revoke(cascade), grant(with_grant_option)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, GrantRow};
    use crate::memory::MemoryEngine;
    use crate::ownership::lookup_grant;

    fn want(with_grant_option: bool) -> DesiredPermission {
        DesiredPermission {
            name: Permission::parse("SELECT").unwrap(),
            with_grant_option,
        }
    }

    fn explicit(with_grant_option: bool) -> ObservedGrant {
        ObservedGrant::Explicit(GrantRow {
            principal: "reader".into(),
            permission: "SELECT".into(),
            with_grant_option,
        })
    }

    fn schema() -> ScopeLocator {
        ScopeLocator::Schema {
            database: "app".into(),
            schema: "sales".into(),
        }
    }

    fn database() -> ScopeLocator {
        ScopeLocator::Database {
            database: "app".into(),
        }
    }

    #[test]
    fn test_diff_table() {
        let s = schema();
        assert_eq!(
            diff(&s, Some(&want(true)), None),
            PermissionAction::Grant {
                with_grant_option: true
            }
        );
        assert_eq!(
            diff(&s, None, Some(&explicit(false))),
            PermissionAction::Revoke { cascade: true }
        );
        assert_eq!(
            diff(&s, Some(&want(false)), Some(&explicit(false))),
            PermissionAction::NoOp
        );
        assert_eq!(
            diff(&s, Some(&want(false)), Some(&explicit(true))),
            PermissionAction::RevokeThenGrant {
                cascade: true,
                with_grant_option: false
            }
        );
        assert_eq!(diff(&s, None, None), PermissionAction::NoOp);
    }

    #[test]
    fn test_implied_is_always_noop() {
        let implied = ObservedGrant::Implied {
            owner: "owner".into(),
        };
        let s = schema();
        assert!(diff(&s, Some(&want(false)), Some(&implied)).is_noop());
        assert!(diff(&s, Some(&want(true)), Some(&implied)).is_noop());
        assert!(diff(&s, None, Some(&implied)).is_noop());
    }

    #[test]
    fn test_cascade_only_for_schema_scope() {
        assert!(revoke_cascades(&schema()));
        assert!(!revoke_cascades(&database()));
        assert!(!revoke_cascades(&ScopeLocator::Server));
        assert_eq!(
            diff(&ScopeLocator::Server, None, Some(&explicit(true))),
            PermissionAction::Revoke { cascade: false }
        );
    }

    #[test]
    fn test_commands_revoke_precedes_grant() {
        let action = diff(&schema(), Some(&want(false)), Some(&explicit(true)));
        let sql: Vec<String> = action
            .commands(&schema(), "reader", &Permission::parse("select").unwrap())
            .iter()
            .map(Command::to_sql)
            .collect();
        assert_eq!(
            sql,
            vec![
                "REVOKE SELECT ON SCHEMA::[sales] FROM [reader] CASCADE",
                "GRANT SELECT ON SCHEMA::[sales] TO [reader]",
            ]
        );
    }

    #[test]
    fn test_downgrade_grant_option_against_engine() {
        let engine = MemoryEngine::new().with_database("app");
        engine
            .execute(&Command::CreateExternalUser {
                database: "app".into(),
                name: "reader".into(),
                sid: None,
                default_schema: "dbo".into(),
            })
            .unwrap();
        engine
            .execute(&Command::CreateSchema {
                database: "app".into(),
                name: "sales".into(),
                owner: None,
            })
            .unwrap();
        let select = Permission::parse("SELECT").unwrap();
        engine
            .execute(&Command::Grant {
                scope: schema(),
                permission: select.clone(),
                principal: "reader".into(),
                with_grant_option: true,
            })
            .unwrap();

        let observed = lookup_grant(&engine, &schema(), "reader", "SELECT").unwrap();
        let action = diff(&schema(), Some(&want(false)), observed.as_ref());
        assert!(matches!(action, PermissionAction::RevokeThenGrant { .. }));
        for command in action.commands(&schema(), "reader", &select) {
            engine.execute(&command).unwrap();
        }

        let reread = lookup_grant(&engine, &schema(), "reader", "SELECT")
            .unwrap()
            .unwrap();
        assert!(!reread.with_grant_option());
        assert!(diff(&schema(), Some(&want(false)), Some(&reread)).is_noop());
    }
}
