//! Catalog implementation over the engine's system views.

use crate::catalog::{
    Catalog, DatabaseRow, GrantRow, Lookup, LoginRow, RoleRow, SchemaRow, UserRow, UserType,
};
use crate::command::{Command, quote_literal};
use crate::error::{Error, Result};
use crate::transport::{Row, Transport};
use crate::types::{RoleScope, ScopeLocator, Target};

/// [`Catalog`] that queries `sys.*` views through a [`Transport`].
pub struct SqlCatalog<T: Transport> {
    transport: T,
}

impl<T: Transport> SqlCatalog<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn query_one<R>(
        &self,
        target: &Target,
        sql: &str,
        decode: impl Fn(&Row) -> Result<R>,
    ) -> Result<Option<R>> {
        let rows = self.transport.query(target, sql)?;
        rows.first().map(decode).transpose()
    }
}

/// Render a lookup as a `WHERE` predicate on the given id and name columns.
fn predicate(lookup: Lookup<'_>, id_column: &str, name_column: &str) -> String {
    match lookup {
        Lookup::Id(id) => format!("{id_column} = {id}"),
        Lookup::Name(name) => format!("{name_column} = {}", quote_literal(name)),
    }
}

fn decode_role(row: &Row) -> Result<RoleRow> {
    Ok(RoleRow {
        id: row.get_i32(0)?,
        name: row.get_str(1)?.to_string(),
        owner: row
            .get_opt_str(2)?
            .filter(|s| !s.is_empty())
            .map(ToString::to_string),
        is_fixed: row.get_bool(3)?,
    })
}

impl<T: Transport> Catalog for SqlCatalog<T> {
    fn database(&self, lookup: Lookup<'_>) -> Result<Option<DatabaseRow>> {
        let sql = format!(
            "SELECT database_id, name FROM sys.databases WHERE {}",
            predicate(lookup, "database_id", "name")
        );
        self.query_one(&Target::Server, &sql, |row| {
            Ok(DatabaseRow {
                id: row.get_i32(0)?,
                name: row.get_str(1)?.to_string(),
            })
        })
    }

    fn login(&self, lookup: Lookup<'_>) -> Result<Option<LoginRow>> {
        let sql = format!(
            "SELECT principal_id, name, ISNULL(default_database_name, 'master'), \
             ISNULL(default_language_name, ''), ISNULL(is_expiration_checked, 0), \
             ISNULL(is_policy_checked, 0), is_disabled \
             FROM sys.sql_logins WHERE {}",
            predicate(lookup, "principal_id", "name")
        );
        self.query_one(&Target::Server, &sql, |row| {
            Ok(LoginRow {
                id: row.get_i32(0)?,
                name: row.get_str(1)?.to_string(),
                default_database: row.get_str(2)?.to_string(),
                default_language: row.get_str(3)?.to_string(),
                check_expiration: row.get_bool(4)?,
                check_policy: row.get_bool(5)?,
                is_disabled: row.get_bool(6)?,
            })
        })
    }

    fn server_role(&self, lookup: Lookup<'_>) -> Result<Option<RoleRow>> {
        let sql = format!(
            "SELECT sp.principal_id, sp.name, ISNULL(owner.name, ''), sp.is_fixed_role \
             FROM sys.server_principals sp \
             LEFT JOIN sys.server_principals owner ON sp.owning_principal_id = owner.principal_id \
             WHERE {} AND sp.type = 'R'",
            predicate(lookup, "sp.principal_id", "sp.name")
        );
        self.query_one(&Target::Server, &sql, decode_role)
    }

    fn user(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<UserRow>> {
        let sql = format!(
            "SELECT dp.principal_id, dp.name, ISNULL(dp.default_schema_name, 'dbo'), dp.type, \
             sp.name, CONVERT(VARCHAR(200), dp.sid, 1) \
             FROM sys.database_principals dp \
             LEFT JOIN sys.server_principals sp ON dp.sid = sp.sid \
             WHERE {} AND dp.type IN ('S', 'U', 'E', 'X')",
            predicate(lookup, "dp.principal_id", "dp.name")
        );
        self.query_one(&Target::Database(database.to_string()), &sql, |row| {
            let code = row.get_str(3)?;
            Ok(UserRow {
                id: row.get_i32(0)?,
                name: row.get_str(1)?.to_string(),
                default_schema: row.get_str(2)?.to_string(),
                user_type: UserType::from_code(code)
                    .ok_or_else(|| Error::Catalog(format!("unknown principal type '{code}'")))?,
                login_name: row.get_opt_str(4)?.map(ToString::to_string),
                sid: row.get_opt_str(5)?.map(ToString::to_string),
            })
        })
    }

    fn database_role(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<RoleRow>> {
        let sql = format!(
            "SELECT dp.principal_id, dp.name, ISNULL(owner.name, ''), dp.is_fixed_role \
             FROM sys.database_principals dp \
             LEFT JOIN sys.database_principals owner ON dp.owning_principal_id = owner.principal_id \
             WHERE {} AND dp.type = 'R'",
            predicate(lookup, "dp.principal_id", "dp.name")
        );
        self.query_one(&Target::Database(database.to_string()), &sql, decode_role)
    }

    fn schema(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<SchemaRow>> {
        let sql = format!(
            "SELECT s.schema_id, s.name, dp.name FROM sys.schemas s \
             INNER JOIN sys.database_principals dp ON s.principal_id = dp.principal_id \
             WHERE {}",
            predicate(lookup, "s.schema_id", "s.name")
        );
        self.query_one(&Target::Database(database.to_string()), &sql, |row| {
            Ok(SchemaRow {
                id: row.get_i32(0)?,
                name: row.get_str(1)?.to_string(),
                owner: row.get_str(2)?.to_string(),
            })
        })
    }

    fn member_roles(&self, database: &str, member: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT r.name FROM sys.database_role_members drm \
             INNER JOIN sys.database_principals r ON drm.role_principal_id = r.principal_id \
             INNER JOIN sys.database_principals m ON drm.member_principal_id = m.principal_id \
             WHERE m.name = {} ORDER BY r.name",
            quote_literal(member)
        );
        let rows = self
            .transport
            .query(&Target::Database(database.to_string()), &sql)?;
        let mut roles = rows
            .iter()
            .map(|row| row.get_str(0).map(ToString::to_string))
            .collect::<Result<Vec<_>>>()?;
        roles.sort();
        Ok(roles)
    }

    fn is_role_member(&self, scope: &RoleScope, role: &str, member: &str) -> Result<bool> {
        let (view, principals) = match scope {
            RoleScope::Server => ("sys.server_role_members", "sys.server_principals"),
            RoleScope::Database(_) => ("sys.database_role_members", "sys.database_principals"),
        };
        let sql = format!(
            "SELECT 1 FROM {view} rm \
             INNER JOIN {principals} r ON rm.role_principal_id = r.principal_id \
             INNER JOIN {principals} m ON rm.member_principal_id = m.principal_id \
             WHERE r.name = {} AND m.name = {}",
            quote_literal(role),
            quote_literal(member)
        );
        Ok(!self.transport.query(&scope.target(), &sql)?.is_empty())
    }

    fn grant(
        &self,
        scope: &ScopeLocator,
        principal: &str,
        permission: &str,
    ) -> Result<Option<GrantRow>> {
        let sql = match scope {
            ScopeLocator::Server => format!(
                "SELECT sp.name, perm.permission_name, CASE WHEN perm.state = 'W' THEN 1 ELSE 0 END \
                 FROM sys.server_permissions perm \
                 INNER JOIN sys.server_principals sp ON perm.grantee_principal_id = sp.principal_id \
                 WHERE sp.name = {} AND perm.permission_name = {} AND perm.class = 100 \
                 AND perm.state IN ('G', 'W')",
                quote_literal(principal),
                quote_literal(permission)
            ),
            ScopeLocator::Database { .. } => format!(
                "SELECT dp.name, perm.permission_name, CASE WHEN perm.state = 'W' THEN 1 ELSE 0 END \
                 FROM sys.database_permissions perm \
                 INNER JOIN sys.database_principals dp ON perm.grantee_principal_id = dp.principal_id \
                 WHERE dp.name = {} AND perm.permission_name = {} AND perm.class = 0 \
                 AND perm.state IN ('G', 'W')",
                quote_literal(principal),
                quote_literal(permission)
            ),
            ScopeLocator::Schema { schema, .. } => format!(
                "SELECT dp.name, perm.permission_name, CASE WHEN perm.state = 'W' THEN 1 ELSE 0 END \
                 FROM sys.database_permissions perm \
                 INNER JOIN sys.database_principals dp ON perm.grantee_principal_id = dp.principal_id \
                 INNER JOIN sys.schemas s ON perm.major_id = s.schema_id \
                 WHERE dp.name = {} AND perm.permission_name = {} AND s.name = {} \
                 AND perm.class = 3 AND perm.state IN ('G', 'W')",
                quote_literal(principal),
                quote_literal(permission),
                quote_literal(schema)
            ),
        };
        self.query_one(&scope.target(), &sql, |row| {
            Ok(GrantRow {
                principal: row.get_str(0)?.to_string(),
                permission: row.get_str(1)?.to_string(),
                with_grant_option: row.get_bool(2)?,
            })
        })
    }

    fn execute(&self, command: &Command) -> Result<()> {
        let target = command.target();
        log::debug!("[{target}] {command}");
        self.transport
            .execute(&target, &command.to_sql())
            .map_err(|e| e.with_statement(command.redacted()))
    }
}
