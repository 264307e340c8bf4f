//! Owner-implied grants.
//!
//! A schema owner holds every permission on the schema without a grant
//! row. When an explicit lookup misses, the owner check synthesizes an
//! implied grant so the differ does not try to grant what is already held.

use crate::catalog::{Catalog, GrantRow};
use crate::error::Result;
use crate::types::ScopeLocator;

/// A grant as observed on the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedGrant {
    /// A grant row exists
    Explicit(GrantRow),
    /// No row, but the principal owns the scope
    Implied { owner: String },
}

impl ObservedGrant {
    /// Implied grants always carry the grant option.
    pub fn with_grant_option(&self) -> bool {
        match self {
            Self::Explicit(row) => row.with_grant_option,
            Self::Implied { .. } => true,
        }
    }

    pub fn is_implied(&self) -> bool {
        matches!(self, Self::Implied { .. })
    }
}

/// Implied grant for `principal` on `scope`, if it owns the scope.
///
/// Only schemas expose an owner that confers permissions, so every other
/// scope returns `None`.
pub fn check_implicit_grant<C: Catalog + ?Sized>(
    catalog: &C,
    scope: &ScopeLocator,
    principal: &str,
) -> Result<Option<ObservedGrant>> {
    let ScopeLocator::Schema { database, schema } = scope else {
        return Ok(None);
    };

    let owner = catalog.schema_owner(database, schema)?;
    Ok(owner
        .filter(|owner| owner.eq_ignore_ascii_case(principal))
        .map(|owner| {
            log::debug!("{principal} owns schema {database}.{schema}; grant is implied");
            ObservedGrant::Implied { owner }
        }))
}

/// Explicit grant first, then the owner-implied one.
pub fn lookup_grant<C: Catalog + ?Sized>(
    catalog: &C,
    scope: &ScopeLocator,
    principal: &str,
    permission: &str,
) -> Result<Option<ObservedGrant>> {
    if let Some(row) = catalog.grant(scope, principal, permission)? {
        return Ok(Some(ObservedGrant::Explicit(row)));
    }
    check_implicit_grant(catalog, scope, principal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, Permission};
    use crate::memory::MemoryEngine;

    fn engine() -> MemoryEngine {
        let engine = MemoryEngine::new().with_database("app");
        for user in ["owner", "reader"] {
            engine
                .execute(&Command::CreateExternalUser {
                    database: "app".into(),
                    name: user.into(),
                    sid: None,
                    default_schema: "dbo".into(),
                })
                .unwrap();
        }
        engine
            .execute(&Command::CreateSchema {
                database: "app".into(),
                name: "sales".into(),
                owner: Some("owner".into()),
            })
            .unwrap();
        engine
    }

    fn sales() -> ScopeLocator {
        ScopeLocator::Schema {
            database: "app".into(),
            schema: "sales".into(),
        }
    }

    #[test]
    fn test_owner_gets_implied_grant() {
        let engine = engine();
        let grant = check_implicit_grant(&engine, &sales(), "owner")
            .unwrap()
            .unwrap();
        assert!(grant.is_implied());
        assert!(grant.with_grant_option());
    }

    #[test]
    fn test_owner_comparison_ignores_case() {
        let engine = engine();
        assert!(
            check_implicit_grant(&engine, &sales(), "OWNER")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_non_owner_and_non_schema_scopes() {
        let engine = engine();
        assert!(
            check_implicit_grant(&engine, &sales(), "reader")
                .unwrap()
                .is_none()
        );
        let db = ScopeLocator::Database {
            database: "app".into(),
        };
        assert!(check_implicit_grant(&engine, &db, "dbo").unwrap().is_none());
        assert!(
            check_implicit_grant(&engine, &ScopeLocator::Server, "sa")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_lookup_prefers_explicit_row() {
        let engine = engine();
        engine
            .execute(&Command::Grant {
                scope: sales(),
                permission: Permission::parse("SELECT").unwrap(),
                principal: "reader".into(),
                with_grant_option: false,
            })
            .unwrap();

        let grant = lookup_grant(&engine, &sales(), "reader", "SELECT")
            .unwrap()
            .unwrap();
        assert!(!grant.is_implied());
        assert!(!grant.with_grant_option());

        let grant = lookup_grant(&engine, &sales(), "owner", "SELECT")
            .unwrap()
            .unwrap();
        assert!(grant.is_implied());

        assert!(
            lookup_grant(&engine, &sales(), "reader", "UPDATE")
                .unwrap()
                .is_none()
        );
    }
}
