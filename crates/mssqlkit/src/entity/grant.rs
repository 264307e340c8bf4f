//! Permissions at server, database and schema scope
//!
//! Creating and converging a grant share one path: look up what the
//! engine shows (explicit row first, then owner-implied), diff against the
//! declaration and run the resulting statements. A schema owner already
//! holds every permission on its schema, so such grants are tracked as
//! implied and never sent.

use super::{Changes, Declared, Tracked, database_exists, missing, require};
use crate::catalog::Catalog;
use crate::command::Permission;
use crate::error::Result;
use crate::ownership::{ObservedGrant, lookup_grant};
use crate::permission::{DesiredPermission, PermissionAction, diff as diff_grant, revoke_cascades};
use crate::types::ScopeLocator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerPermissionSpec {
    pub principal: String,
    pub permission: Permission,
    #[serde(default)]
    pub with_grant_option: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPermissionState {
    pub principal: String,
    pub permission: Permission,
    pub with_grant_option: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabasePermissionSpec {
    pub database: String,
    pub principal: String,
    pub permission: Permission,
    #[serde(default)]
    pub with_grant_option: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabasePermissionState {
    pub database: String,
    pub principal: String,
    pub permission: Permission,
    pub with_grant_option: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaPermissionSpec {
    pub database: String,
    pub schema: String,
    pub principal: String,
    pub permission: Permission,
    #[serde(default)]
    pub with_grant_option: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPermissionState {
    pub database: String,
    pub schema: String,
    pub principal: String,
    pub permission: Permission,
    pub with_grant_option: bool,
    /// Held through schema ownership rather than a grant row
    #[serde(default)]
    pub implied: bool,
}

/// A grant as seen after reconciling, with the option to record.
struct Held {
    with_grant_option: bool,
    implied: bool,
}

impl Held {
    /// Implied grants record the declared option so they never show drift.
    fn from_observed(observed: &ObservedGrant, declared: bool) -> Self {
        match observed {
            ObservedGrant::Explicit(row) => Self {
                with_grant_option: row.with_grant_option,
                implied: false,
            },
            ObservedGrant::Implied { .. } => Self {
                with_grant_option: declared,
                implied: true,
            },
        }
    }
}

/// Bring one grant in line with the declaration and report what is held.
fn reconcile(
    catalog: &dyn Catalog,
    scope: &ScopeLocator,
    principal: &str,
    permission: &Permission,
    with_grant_option: bool,
) -> Result<Held> {
    let observed = lookup_grant(catalog, scope, principal, permission.as_str())?;
    let desired = DesiredPermission {
        name: permission.clone(),
        with_grant_option,
    };
    let action = diff_grant(scope, Some(&desired), observed.as_ref());

    if let Some(observed) = observed.as_ref().filter(|_| action.is_noop()) {
        return Ok(Held::from_observed(observed, with_grant_option));
    }
    for command in action.commands(scope, principal, permission) {
        catalog.execute(&command)?;
    }

    lookup_grant(catalog, scope, principal, permission.as_str())?
        .map(|observed| Held::from_observed(&observed, with_grant_option))
        .ok_or_else(|| missing("grant", format!("{permission} on {scope} to {principal}")))
}

/// What the engine shows now; `None` when the grant is gone.
fn observe(
    catalog: &dyn Catalog,
    scope: &ScopeLocator,
    principal: &str,
    permission: &Permission,
    recorded: bool,
) -> Result<Option<Held>> {
    let database = match scope {
        ScopeLocator::Server => None,
        ScopeLocator::Database { database } | ScopeLocator::Schema { database, .. } => {
            Some(database)
        }
    };
    if let Some(database) = database
        && !database_exists(catalog, database)?
    {
        return Ok(None);
    }
    Ok(lookup_grant(catalog, scope, principal, permission.as_str())?
        .map(|observed| Held::from_observed(&observed, recorded)))
}

/// Revoke an explicit grant. Implied grants go with ownership, not here.
fn revoke(
    catalog: &dyn Catalog,
    scope: &ScopeLocator,
    principal: &str,
    permission: &Permission,
    implied: bool,
) -> Result<()> {
    if implied {
        log::debug!("{permission} on {scope} is implied for {principal}; nothing to revoke");
        return Ok(());
    }
    let action = PermissionAction::Revoke {
        cascade: revoke_cascades(scope),
    };
    for command in action.commands(scope, principal, permission) {
        catalog.execute(&command)?;
    }
    Ok(())
}

impl ServerPermissionSpec {
    fn state(&self, held: &Held) -> ServerPermissionState {
        ServerPermissionState {
            principal: self.principal.clone(),
            permission: self.permission.clone(),
            with_grant_option: held.with_grant_option,
        }
    }
}

impl Declared for ServerPermissionSpec {
    type State = ServerPermissionState;

    fn validate(&self) -> Result<()> {
        require("principal", &self.principal)
    }

    fn describe(&self) -> String {
        format!(
            "{} on server to {}{}",
            self.permission,
            self.principal,
            grant_option_suffix(self.with_grant_option)
        )
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<ServerPermissionState> {
        let held = reconcile(
            catalog,
            &ScopeLocator::Server,
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?;
        Ok(self.state(&held))
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<ServerPermissionState>> {
        Ok(observe(
            catalog,
            &ScopeLocator::Server,
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?
        .map(|held| self.state(&held)))
    }

    fn changes(&self, state: &ServerPermissionState) -> Changes {
        Changes::new()
            .identity("principal", state.principal != self.principal)
            .identity("permission", state.permission != self.permission)
            .mutable(
                "with_grant_option",
                state.with_grant_option != self.with_grant_option,
            )
    }

    fn converge(
        &self,
        _state: &ServerPermissionState,
        catalog: &dyn Catalog,
    ) -> Result<ServerPermissionState> {
        self.create(catalog)
    }
}

impl Tracked for ServerPermissionState {
    fn summary(&self) -> String {
        format!(
            "{} on server to {}{}",
            self.permission,
            self.principal,
            grant_option_suffix(self.with_grant_option)
        )
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        Ok(observe(
            catalog,
            &ScopeLocator::Server,
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?
        .map(|held| Self {
            with_grant_option: held.with_grant_option,
            ..self.clone()
        }))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        revoke(
            catalog,
            &ScopeLocator::Server,
            &self.principal,
            &self.permission,
            false,
        )
    }
}

impl DatabasePermissionSpec {
    fn scope(&self) -> ScopeLocator {
        ScopeLocator::Database {
            database: self.database.clone(),
        }
    }

    fn state(&self, held: &Held) -> DatabasePermissionState {
        DatabasePermissionState {
            database: self.database.clone(),
            principal: self.principal.clone(),
            permission: self.permission.clone(),
            with_grant_option: held.with_grant_option,
        }
    }
}

impl DatabasePermissionState {
    fn scope(&self) -> ScopeLocator {
        ScopeLocator::Database {
            database: self.database.clone(),
        }
    }
}

impl Declared for DatabasePermissionSpec {
    type State = DatabasePermissionState;

    fn validate(&self) -> Result<()> {
        require("database", &self.database)?;
        require("principal", &self.principal)
    }

    fn describe(&self) -> String {
        format!(
            "{} on database {} to {}{}",
            self.permission,
            self.database,
            self.principal,
            grant_option_suffix(self.with_grant_option)
        )
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<DatabasePermissionState> {
        let held = reconcile(
            catalog,
            &self.scope(),
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?;
        Ok(self.state(&held))
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<DatabasePermissionState>> {
        Ok(observe(
            catalog,
            &self.scope(),
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?
        .map(|held| self.state(&held)))
    }

    fn changes(&self, state: &DatabasePermissionState) -> Changes {
        Changes::new()
            .identity("database", state.database != self.database)
            .identity("principal", state.principal != self.principal)
            .identity("permission", state.permission != self.permission)
            .mutable(
                "with_grant_option",
                state.with_grant_option != self.with_grant_option,
            )
    }

    fn converge(
        &self,
        _state: &DatabasePermissionState,
        catalog: &dyn Catalog,
    ) -> Result<DatabasePermissionState> {
        self.create(catalog)
    }
}

impl Tracked for DatabasePermissionState {
    fn summary(&self) -> String {
        format!(
            "{} on database {} to {}{}",
            self.permission,
            self.database,
            self.principal,
            grant_option_suffix(self.with_grant_option)
        )
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        Ok(observe(
            catalog,
            &self.scope(),
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?
        .map(|held| Self {
            with_grant_option: held.with_grant_option,
            ..self.clone()
        }))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        revoke(
            catalog,
            &self.scope(),
            &self.principal,
            &self.permission,
            false,
        )
    }
}

impl SchemaPermissionSpec {
    fn scope(&self) -> ScopeLocator {
        ScopeLocator::Schema {
            database: self.database.clone(),
            schema: self.schema.clone(),
        }
    }

    fn state(&self, held: &Held) -> SchemaPermissionState {
        SchemaPermissionState {
            database: self.database.clone(),
            schema: self.schema.clone(),
            principal: self.principal.clone(),
            permission: self.permission.clone(),
            with_grant_option: held.with_grant_option,
            implied: held.implied,
        }
    }
}

impl SchemaPermissionState {
    fn scope(&self) -> ScopeLocator {
        ScopeLocator::Schema {
            database: self.database.clone(),
            schema: self.schema.clone(),
        }
    }
}

impl Declared for SchemaPermissionSpec {
    type State = SchemaPermissionState;

    fn validate(&self) -> Result<()> {
        require("database", &self.database)?;
        require("schema", &self.schema)?;
        require("principal", &self.principal)
    }

    fn describe(&self) -> String {
        format!(
            "{} on schema {}.{} to {}{}",
            self.permission,
            self.database,
            self.schema,
            self.principal,
            grant_option_suffix(self.with_grant_option)
        )
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<SchemaPermissionState> {
        let held = reconcile(
            catalog,
            &self.scope(),
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?;
        Ok(self.state(&held))
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<SchemaPermissionState>> {
        Ok(observe(
            catalog,
            &self.scope(),
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?
        .map(|held| self.state(&held)))
    }

    fn changes(&self, state: &SchemaPermissionState) -> Changes {
        Changes::new()
            .identity("database", state.database != self.database)
            .identity("schema", state.schema != self.schema)
            .identity("principal", state.principal != self.principal)
            .identity("permission", state.permission != self.permission)
            .mutable(
                "with_grant_option",
                !state.implied && state.with_grant_option != self.with_grant_option,
            )
    }

    fn converge(
        &self,
        _state: &SchemaPermissionState,
        catalog: &dyn Catalog,
    ) -> Result<SchemaPermissionState> {
        self.create(catalog)
    }
}

impl Tracked for SchemaPermissionState {
    fn summary(&self) -> String {
        let via = if self.implied { " (via ownership)" } else { "" };
        format!(
            "{} on schema {}.{} to {}{}{via}",
            self.permission,
            self.database,
            self.schema,
            self.principal,
            grant_option_suffix(self.with_grant_option)
        )
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        Ok(observe(
            catalog,
            &self.scope(),
            &self.principal,
            &self.permission,
            self.with_grant_option,
        )?
        .map(|held| Self {
            with_grant_option: held.with_grant_option,
            implied: held.implied,
            ..self.clone()
        }))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        revoke(
            catalog,
            &self.scope(),
            &self.principal,
            &self.permission,
            self.implied,
        )
    }
}

fn grant_option_suffix(with_grant_option: bool) -> &'static str {
    if with_grant_option {
        " with grant option"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::memory::MemoryEngine;
    use crate::types::RoleScope;

    fn perm(name: &str) -> Permission {
        Permission::parse(name).unwrap()
    }

    fn engine() -> MemoryEngine {
        let engine = MemoryEngine::new().with_database("app");
        for name in ["analysts", "sales_team"] {
            engine
                .execute(&Command::CreateRole {
                    scope: RoleScope::Database("app".into()),
                    name: name.into(),
                    owner: None,
                })
                .unwrap();
        }
        engine
            .execute(&Command::CreateSchema {
                database: "app".into(),
                name: "sales".into(),
                owner: Some("sales_team".into()),
            })
            .unwrap();
        engine.clear_log();
        engine
    }

    fn schema_grant(principal: &str, with_grant_option: bool) -> SchemaPermissionSpec {
        SchemaPermissionSpec {
            database: "app".into(),
            schema: "sales".into(),
            principal: principal.into(),
            permission: perm("SELECT"),
            with_grant_option,
        }
    }

    #[test]
    fn test_schema_grant_lifecycle() {
        let engine = engine();
        let state = schema_grant("analysts", false).create(&engine).unwrap();
        assert!(!state.implied);
        assert!(!state.with_grant_option);
        assert_eq!(
            engine.statements(),
            vec!["GRANT SELECT ON SCHEMA::[sales] TO [analysts]"]
        );
        assert_eq!(state.refresh(&engine).unwrap(), Some(state.clone()));

        engine.clear_log();
        state.destroy(&engine).unwrap();
        assert_eq!(
            engine.statements(),
            vec!["REVOKE SELECT ON SCHEMA::[sales] FROM [analysts] CASCADE"]
        );
        assert_eq!(state.refresh(&engine).unwrap(), None);
    }

    #[test]
    fn test_grant_option_downgrade_revokes_then_grants() {
        let engine = engine();
        let state = schema_grant("analysts", true).create(&engine).unwrap();
        assert!(state.with_grant_option);

        let next = schema_grant("analysts", false);
        assert!(next.changes(&state).has("with_grant_option"));
        engine.clear_log();
        let state = next.converge(&state, &engine).unwrap();
        assert_eq!(
            engine.statements(),
            vec![
                "REVOKE SELECT ON SCHEMA::[sales] FROM [analysts] CASCADE",
                "GRANT SELECT ON SCHEMA::[sales] TO [analysts]",
            ]
        );
        assert!(!state.with_grant_option);

        engine.clear_log();
        next.converge(&state, &engine).unwrap();
        assert!(engine.commands().is_empty());
    }

    #[test]
    fn test_owner_grant_is_implied_and_never_sent() {
        let engine = engine();
        let spec = schema_grant("sales_team", false);
        let state = spec.create(&engine).unwrap();
        assert!(state.implied);
        assert!(engine.commands().is_empty());
        assert!(!spec.changes(&state).into_diff().is_change());

        // Still held after a refresh, and dropping it leaves ownership alone
        let refreshed = state.refresh(&engine).unwrap().unwrap();
        assert!(refreshed.implied);
        state.destroy(&engine).unwrap();
        assert!(engine.commands().is_empty());
    }

    #[test]
    fn test_owner_comparison_ignores_case() {
        let engine = engine();
        let state = schema_grant("SALES_TEAM", false).create(&engine).unwrap();
        assert!(state.implied);
    }

    #[test]
    fn test_implied_grant_disappears_with_ownership() {
        let engine = engine();
        let state = schema_grant("sales_team", false).create(&engine).unwrap();
        engine
            .execute(&Command::AlterSchemaOwner {
                database: "app".into(),
                name: "sales".into(),
                owner: "dbo".into(),
            })
            .unwrap();
        assert_eq!(state.refresh(&engine).unwrap(), None);
    }

    #[test]
    fn test_refresh_backfills_grant_option_drift() {
        let engine = engine();
        let state = schema_grant("analysts", false).create(&engine).unwrap();
        engine
            .execute(&Command::Grant {
                scope: state.scope(),
                permission: perm("SELECT"),
                principal: "analysts".into(),
                with_grant_option: true,
            })
            .unwrap();

        let refreshed = state.refresh(&engine).unwrap().unwrap();
        assert!(refreshed.with_grant_option);
        assert!(
            schema_grant("analysts", false)
                .changes(&refreshed)
                .has("with_grant_option")
        );
    }

    #[test]
    fn test_database_grant_does_not_cascade() {
        let engine = engine();
        let spec = DatabasePermissionSpec {
            database: "app".into(),
            principal: "analysts".into(),
            permission: perm("view definition"),
            with_grant_option: false,
        };
        let state = spec.create(&engine).unwrap();
        state.destroy(&engine).unwrap();
        assert_eq!(
            engine.statements(),
            vec![
                "GRANT VIEW DEFINITION TO [analysts]",
                "REVOKE VIEW DEFINITION FROM [analysts]",
            ]
        );
    }

    #[test]
    fn test_grant_to_dbo_surfaces_engine_error() {
        let engine = engine();
        let spec = DatabasePermissionSpec {
            database: "app".into(),
            principal: "dbo".into(),
            permission: perm("SELECT"),
            with_grant_option: false,
        };
        let err = spec.create(&engine).unwrap_err();
        assert!(err.to_string().contains("Cannot grant, deny, or revoke"));
    }

    #[test]
    fn test_server_grant_and_database_gone() {
        let engine = engine();
        let server = ServerPermissionSpec {
            principal: "sa".into(),
            permission: perm("VIEW SERVER STATE"),
            with_grant_option: true,
        }
        .create(&engine)
        .unwrap();
        assert!(server.with_grant_option);
        assert!(server.refresh(&engine).unwrap().is_some());

        let db = schema_grant("analysts", false).create(&engine).unwrap();
        engine
            .execute(&Command::DropDatabase { name: "app".into() })
            .unwrap();
        assert_eq!(db.refresh(&engine).unwrap(), None);
    }

    #[test]
    fn test_manifest_normalizes_permission() {
        let spec: SchemaPermissionSpec = toml::from_str(
            r#"
            database = "app"
            schema = "sales"
            principal = "analysts"
            permission = "select"
            "#,
        )
        .unwrap();
        assert_eq!(spec, schema_grant("analysts", false));

        let bad = toml::from_str::<SchemaPermissionSpec>(
            r#"
            database = "app"
            schema = "sales"
            principal = "analysts"
            permission = "SELECT; DROP TABLE x"
            "#,
        );
        assert!(bad.is_err());
    }
}
