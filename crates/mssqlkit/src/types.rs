//! Scope and target types shared by commands, catalog reads and differs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a statement runs: the server, or a specific database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Server-level connection (logins, server roles, databases)
    Server,
    /// Connection scoped to the named database
    Database(String),
}

impl Target {
    /// Database name for scoped targets.
    pub fn database(&self) -> Option<&str> {
        match self {
            Target::Server => None,
            Target::Database(name) => Some(name),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Server => f.write_str("server"),
            Target::Database(name) => write!(f, "database {name}"),
        }
    }
}

/// Scope of a role: server roles, or database roles in one database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleScope {
    Server,
    Database(String),
}

impl RoleScope {
    pub fn target(&self) -> Target {
        match self {
            RoleScope::Server => Target::Server,
            RoleScope::Database(db) => Target::Database(db.clone()),
        }
    }

    /// Keyword used in `CREATE ... ROLE` and `ALTER ... ROLE`.
    pub fn keyword(&self) -> &'static str {
        match self {
            RoleScope::Server => "SERVER ROLE",
            RoleScope::Database(_) => "ROLE",
        }
    }
}

/// Securable a permission is granted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeLocator {
    /// Server-level permission (class 100)
    Server,
    /// Database-level permission (class 0)
    Database { database: String },
    /// Permission on a schema within a database (class 3)
    Schema { database: String, schema: String },
}

impl ScopeLocator {
    pub fn target(&self) -> Target {
        match self {
            ScopeLocator::Server => Target::Server,
            ScopeLocator::Database { database } | ScopeLocator::Schema { database, .. } => {
                Target::Database(database.clone())
            }
        }
    }
}

impl fmt::Display for ScopeLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeLocator::Server => f.write_str("server"),
            ScopeLocator::Database { database } => write!(f, "database {database}"),
            ScopeLocator::Schema { database, schema } => write!(f, "schema {database}.{schema}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_targets() {
        assert_eq!(ScopeLocator::Server.target(), Target::Server);
        assert_eq!(
            ScopeLocator::Schema {
                database: "app".into(),
                schema: "sales".into()
            }
            .target(),
            Target::Database("app".into())
        );
        assert_eq!(RoleScope::Database("app".into()).keyword(), "ROLE");
        assert_eq!(RoleScope::Server.keyword(), "SERVER ROLE");
    }
}
