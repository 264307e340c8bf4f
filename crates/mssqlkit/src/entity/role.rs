//! User-defined roles at server and database scope

use super::{Changes, Declared, Tracked, database_exists, missing, require};
use crate::catalog::{Catalog, Lookup, RoleRow};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::resolve::resolve;
use crate::types::RoleScope;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerRoleSpec {
    pub name: String,
    /// Unset leaves ownership with the connecting login
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRoleState {
    pub id: i32,
    pub name: String,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseRoleSpec {
    pub database: String,
    pub name: String,
    /// Unset leaves ownership with `dbo`
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRoleState {
    pub id: i32,
    pub database: String,
    pub name: String,
    pub owner: Option<String>,
}

fn owner_changed(desired: Option<&String>, observed: Option<&String>) -> bool {
    desired.is_some_and(|owner| Some(owner) != observed)
}

fn refuse_fixed(row: &RoleRow) -> Result<()> {
    if row.is_fixed {
        return Err(Error::InvalidInput(format!(
            "role '{}' is a fixed role and cannot be managed",
            row.name
        )));
    }
    Ok(())
}

impl From<RoleRow> for ServerRoleState {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
        }
    }
}

impl ServerRoleSpec {
    fn read(&self, catalog: &dyn Catalog) -> Result<ServerRoleState> {
        catalog
            .server_role(Lookup::Name(&self.name))?
            .map(ServerRoleState::from)
            .ok_or_else(|| missing("server role", &self.name))
    }
}

impl Declared for ServerRoleSpec {
    type State = ServerRoleState;

    fn validate(&self) -> Result<()> {
        require("role name", &self.name)
    }

    fn describe(&self) -> String {
        match &self.owner {
            Some(owner) => format!("server role {} owned by {owner}", self.name),
            None => format!("server role {}", self.name),
        }
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<ServerRoleState> {
        catalog.execute(&Command::CreateRole {
            scope: RoleScope::Server,
            name: self.name.clone(),
            owner: self.owner.clone(),
        })?;
        self.read(catalog)
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<ServerRoleState>> {
        let Some(row) = catalog.server_role(Lookup::Name(&self.name))? else {
            return Ok(None);
        };
        refuse_fixed(&row)?;
        Ok(Some(row.into()))
    }

    fn changes(&self, state: &ServerRoleState) -> Changes {
        Changes::new()
            .identity("name", state.name != self.name)
            .mutable(
                "owner",
                owner_changed(self.owner.as_ref(), state.owner.as_ref()),
            )
    }

    fn converge(&self, state: &ServerRoleState, catalog: &dyn Catalog) -> Result<ServerRoleState> {
        if let Some(owner) = &self.owner
            && owner_changed(Some(owner), state.owner.as_ref())
        {
            catalog.execute(&Command::AlterRoleOwner {
                scope: RoleScope::Server,
                name: self.name.clone(),
                owner: owner.clone(),
            })?;
        }
        self.read(catalog)
    }
}

impl Tracked for ServerRoleState {
    fn summary(&self) -> String {
        format!("server role {}", self.name)
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        Ok(resolve(Some(self.id), &self.name, |l| catalog.server_role(l))?
            .into_entity()
            .map(Self::from))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        catalog.execute(&Command::DropRole {
            scope: RoleScope::Server,
            name: self.name.clone(),
        })
    }
}

impl DatabaseRoleState {
    fn from_row(database: &str, row: RoleRow) -> Self {
        Self {
            id: row.id,
            database: database.to_string(),
            name: row.name,
            owner: row.owner,
        }
    }

    fn scope(&self) -> RoleScope {
        RoleScope::Database(self.database.clone())
    }
}

impl DatabaseRoleSpec {
    fn scope(&self) -> RoleScope {
        RoleScope::Database(self.database.clone())
    }

    fn read(&self, catalog: &dyn Catalog) -> Result<DatabaseRoleState> {
        catalog
            .database_role(&self.database, Lookup::Name(&self.name))?
            .map(|row| DatabaseRoleState::from_row(&self.database, row))
            .ok_or_else(|| missing("database role", format!("{}.{}", self.database, self.name)))
    }
}

impl Declared for DatabaseRoleSpec {
    type State = DatabaseRoleState;

    fn validate(&self) -> Result<()> {
        require("database", &self.database)?;
        require("role name", &self.name)
    }

    fn describe(&self) -> String {
        match &self.owner {
            Some(owner) => format!(
                "role {} in {} owned by {owner}",
                self.name, self.database
            ),
            None => format!("role {} in {}", self.name, self.database),
        }
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<DatabaseRoleState> {
        catalog.execute(&Command::CreateRole {
            scope: self.scope(),
            name: self.name.clone(),
            owner: self.owner.clone(),
        })?;
        self.read(catalog)
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<DatabaseRoleState>> {
        let Some(row) = catalog.database_role(&self.database, Lookup::Name(&self.name))? else {
            return Ok(None);
        };
        refuse_fixed(&row)?;
        Ok(Some(DatabaseRoleState::from_row(&self.database, row)))
    }

    fn changes(&self, state: &DatabaseRoleState) -> Changes {
        Changes::new()
            .identity("database", state.database != self.database)
            .identity("name", state.name != self.name)
            .mutable(
                "owner",
                owner_changed(self.owner.as_ref(), state.owner.as_ref()),
            )
    }

    fn converge(
        &self,
        state: &DatabaseRoleState,
        catalog: &dyn Catalog,
    ) -> Result<DatabaseRoleState> {
        if let Some(owner) = &self.owner
            && owner_changed(Some(owner), state.owner.as_ref())
        {
            catalog.execute(&Command::AlterRoleOwner {
                scope: self.scope(),
                name: self.name.clone(),
                owner: owner.clone(),
            })?;
        }
        self.read(catalog)
    }
}

impl Tracked for DatabaseRoleState {
    fn summary(&self) -> String {
        format!("role {} in {}", self.name, self.database)
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        if !database_exists(catalog, &self.database)? {
            return Ok(None);
        }
        Ok(
            resolve(Some(self.id), &self.name, |l| {
                catalog.database_role(&self.database, l)
            })?
            .into_entity()
            .map(|row| Self::from_row(&self.database, row)),
        )
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        catalog.execute(&Command::DropRole {
            scope: self.scope(),
            name: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;

    fn reporting(owner: Option<&str>) -> DatabaseRoleSpec {
        DatabaseRoleSpec {
            database: "app".into(),
            name: "reporting".into(),
            owner: owner.map(String::from),
        }
    }

    #[test]
    fn test_database_role_defaults_to_dbo_owner() {
        let engine = MemoryEngine::new().with_database("app");
        let state = reporting(None).create(&engine).unwrap();
        assert_eq!(state.owner.as_deref(), Some("dbo"));
        assert_eq!(engine.statements(), vec!["CREATE ROLE [reporting]"]);
        assert!(!reporting(None).changes(&state).into_diff().is_change());
    }

    #[test]
    fn test_owner_change_converges_once() {
        let engine = MemoryEngine::new().with_database("app");
        let state = reporting(None).create(&engine).unwrap();
        DatabaseRoleSpec {
            database: "app".into(),
            name: "auditors".into(),
            owner: None,
        }
        .create(&engine)
        .unwrap();

        let next = reporting(Some("auditors"));
        assert!(next.changes(&state).has("owner"));
        engine.clear_log();
        let state = next.converge(&state, &engine).unwrap();
        assert_eq!(
            engine.statements(),
            vec!["ALTER AUTHORIZATION ON ROLE::[reporting] TO [auditors]"]
        );
        assert_eq!(state.owner.as_deref(), Some("auditors"));

        engine.clear_log();
        next.converge(&state, &engine).unwrap();
        assert!(engine.commands().is_empty());
    }

    #[test]
    fn test_drop_role_with_members_is_rejected() {
        let engine = MemoryEngine::new().with_database("app");
        let state = reporting(None).create(&engine).unwrap();
        engine
            .execute(&Command::AddRoleMember {
                scope: RoleScope::Database("app".into()),
                role: "reporting".into(),
                member: "dbo".into(),
            })
            .unwrap();

        let err = state.destroy(&engine).unwrap_err();
        assert!(err.to_string().contains("The role has members"));
    }

    #[test]
    fn test_fixed_roles_cannot_be_imported() {
        let engine = MemoryEngine::new().with_database("app");
        let fixed = DatabaseRoleSpec {
            database: "app".into(),
            name: "db_datareader".into(),
            owner: None,
        };
        assert!(fixed.import(&engine).is_err());

        let sysadmin = ServerRoleSpec {
            name: "sysadmin".into(),
            owner: None,
        };
        assert!(sysadmin.import(&engine).is_err());
    }

    #[test]
    fn test_server_role_lifecycle() {
        let engine = MemoryEngine::new();
        let spec = ServerRoleSpec {
            name: "ops".into(),
            owner: None,
        };
        let state = spec.create(&engine).unwrap();
        assert_eq!(state.owner.as_deref(), Some("sa"));
        assert_eq!(state.refresh(&engine).unwrap(), Some(state.clone()));

        state.destroy(&engine).unwrap();
        assert_eq!(state.refresh(&engine).unwrap(), None);
        assert_eq!(
            engine.statements(),
            vec!["CREATE SERVER ROLE [ops]", "DROP SERVER ROLE [ops]"]
        );
    }

    #[test]
    fn test_database_role_gone_with_database() {
        let engine = MemoryEngine::new().with_database("app");
        let state = reporting(None).create(&engine).unwrap();
        engine
            .execute(&Command::DropDatabase { name: "app".into() })
            .unwrap();
        assert_eq!(state.refresh(&engine).unwrap(), None);
    }
}
