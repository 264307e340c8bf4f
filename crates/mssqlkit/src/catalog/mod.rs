//! Catalog reads and statement execution.
//!
//! The [`Catalog`] trait is the handle every lifecycle operation receives.
//! It answers point lookups against the engine's system views and runs
//! [`Command`]s. [`SqlCatalog`] implements it over any [`Transport`];
//! `MemoryEngine` implements it in memory for tests.

pub mod sql;

pub use sql::SqlCatalog;

use crate::command::Command;
use crate::error::Result;
use crate::types::{RoleScope, ScopeLocator};

/// How to find an entity: by its volatile id or by its durable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(i32),
    Name(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRow {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRow {
    pub id: i32,
    pub name: String,
    pub default_database: String,
    pub default_language: String,
    pub check_expiration: bool,
    pub check_policy: bool,
    pub is_disabled: bool,
}

/// Principal type code from `sys.database_principals.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    /// `S`: SQL user
    Sql,
    /// `U`: Windows user
    Windows,
    /// `E`: external user or application
    External,
    /// `X`: external group
    ExternalGroup,
}

impl UserType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "S" => Some(Self::Sql),
            "U" => Some(Self::Windows),
            "E" => Some(Self::External),
            "X" => Some(Self::ExternalGroup),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Sql => "S",
            Self::Windows => "U",
            Self::External => "E",
            Self::ExternalGroup => "X",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: i32,
    pub name: String,
    pub default_schema: String,
    pub user_type: UserType,
    /// Login mapped through the SID, if any
    pub login_name: Option<String>,
    /// SID rendered as `0x...`
    pub sid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRow {
    pub id: i32,
    pub name: String,
    pub owner: Option<String>,
    pub is_fixed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRow {
    pub id: i32,
    pub name: String,
    pub owner: String,
}

/// Rows that carry the durable name of the object they describe.
pub trait Named {
    fn name(&self) -> &str;
}

macro_rules! named {
    ($($row:ty),+) => {
        $(impl Named for $row {
            fn name(&self) -> &str {
                &self.name
            }
        })+
    };
}

named!(DatabaseRow, LoginRow, UserRow, RoleRow, SchemaRow);

/// An explicit GRANT row (state `G` or `W`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRow {
    pub principal: String,
    pub permission: String,
    pub with_grant_option: bool,
}

/// Read access to the engine's catalog plus statement execution.
pub trait Catalog {
    fn database(&self, lookup: Lookup<'_>) -> Result<Option<DatabaseRow>>;

    fn login(&self, lookup: Lookup<'_>) -> Result<Option<LoginRow>>;

    fn server_role(&self, lookup: Lookup<'_>) -> Result<Option<RoleRow>>;

    /// SQL, external and Windows users of a database.
    fn user(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<UserRow>>;

    fn database_role(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<RoleRow>>;

    fn schema(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<SchemaRow>>;

    /// Database roles `member` belongs to, sorted by name.
    fn member_roles(&self, database: &str, member: &str) -> Result<Vec<String>>;

    fn is_role_member(&self, scope: &RoleScope, role: &str, member: &str) -> Result<bool>;

    /// Explicit grant of `permission` to `principal` on `scope`. DENY rows are ignored.
    fn grant(
        &self,
        scope: &ScopeLocator,
        principal: &str,
        permission: &str,
    ) -> Result<Option<GrantRow>>;

    /// Owner of a schema.
    fn schema_owner(&self, database: &str, schema: &str) -> Result<Option<String>> {
        Ok(self
            .schema(database, Lookup::Name(schema))?
            .map(|row| row.owner))
    }

    /// Run a statement. Errors carry the engine text verbatim.
    fn execute(&self, command: &Command) -> Result<()>;
}

impl<C: Catalog + ?Sized> Catalog for &C {
    fn database(&self, lookup: Lookup<'_>) -> Result<Option<DatabaseRow>> {
        (**self).database(lookup)
    }

    fn login(&self, lookup: Lookup<'_>) -> Result<Option<LoginRow>> {
        (**self).login(lookup)
    }

    fn server_role(&self, lookup: Lookup<'_>) -> Result<Option<RoleRow>> {
        (**self).server_role(lookup)
    }

    fn user(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<UserRow>> {
        (**self).user(database, lookup)
    }

    fn database_role(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<RoleRow>> {
        (**self).database_role(database, lookup)
    }

    fn schema(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<SchemaRow>> {
        (**self).schema(database, lookup)
    }

    fn member_roles(&self, database: &str, member: &str) -> Result<Vec<String>> {
        (**self).member_roles(database, member)
    }

    fn is_role_member(&self, scope: &RoleScope, role: &str, member: &str) -> Result<bool> {
        (**self).is_role_member(scope, role, member)
    }

    fn grant(
        &self,
        scope: &ScopeLocator,
        principal: &str,
        permission: &str,
    ) -> Result<Option<GrantRow>> {
        (**self).grant(scope, principal, permission)
    }

    fn schema_owner(&self, database: &str, schema: &str) -> Result<Option<String>> {
        (**self).schema_owner(database, schema)
    }

    fn execute(&self, command: &Command) -> Result<()> {
        (**self).execute(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_codes() {
        for t in [
            UserType::Sql,
            UserType::Windows,
            UserType::External,
            UserType::ExternalGroup,
        ] {
            assert_eq!(UserType::from_code(t.code()), Some(t));
        }
        assert_eq!(UserType::from_code("R"), None);
    }
}
