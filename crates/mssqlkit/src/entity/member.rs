//! Standalone role memberships
//!
//! A membership has no id of its own; it exists while the engine reports
//! the member in the role. Every attribute is identity.

use super::{Changes, Declared, Tracked, database_exists, missing, require};
use crate::catalog::Catalog;
use crate::command::Command;
use crate::error::Result;
use crate::types::RoleScope;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerRoleMemberSpec {
    pub role: String,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRoleMemberState {
    pub role: String,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseRoleMemberSpec {
    pub database: String,
    pub role: String,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRoleMemberState {
    pub database: String,
    pub role: String,
    pub member: String,
}

fn add(catalog: &dyn Catalog, scope: RoleScope, role: &str, member: &str) -> Result<()> {
    catalog.execute(&Command::AddRoleMember {
        scope: scope.clone(),
        role: role.to_string(),
        member: member.to_string(),
    })?;
    if !catalog.is_role_member(&scope, role, member)? {
        return Err(missing("role membership", format!("{member} in {role}")));
    }
    Ok(())
}

fn remove(catalog: &dyn Catalog, scope: RoleScope, role: &str, member: &str) -> Result<()> {
    catalog.execute(&Command::DropRoleMember {
        scope,
        role: role.to_string(),
        member: member.to_string(),
    })
}

impl Declared for ServerRoleMemberSpec {
    type State = ServerRoleMemberState;

    fn validate(&self) -> Result<()> {
        require("role", &self.role)?;
        require("member", &self.member)
    }

    fn describe(&self) -> String {
        format!("{} in server role {}", self.member, self.role)
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<ServerRoleMemberState> {
        add(catalog, RoleScope::Server, &self.role, &self.member)?;
        Ok(ServerRoleMemberState {
            role: self.role.clone(),
            member: self.member.clone(),
        })
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<ServerRoleMemberState>> {
        let state = ServerRoleMemberState {
            role: self.role.clone(),
            member: self.member.clone(),
        };
        state.refresh(catalog)
    }

    fn changes(&self, state: &ServerRoleMemberState) -> Changes {
        Changes::new()
            .identity("role", state.role != self.role)
            .identity("member", state.member != self.member)
    }

    fn converge(
        &self,
        state: &ServerRoleMemberState,
        _catalog: &dyn Catalog,
    ) -> Result<ServerRoleMemberState> {
        Ok(state.clone())
    }
}

impl Tracked for ServerRoleMemberState {
    fn summary(&self) -> String {
        format!("{} in server role {}", self.member, self.role)
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        let present = catalog.is_role_member(&RoleScope::Server, &self.role, &self.member)?;
        Ok(present.then(|| self.clone()))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        remove(catalog, RoleScope::Server, &self.role, &self.member)
    }
}

impl Declared for DatabaseRoleMemberSpec {
    type State = DatabaseRoleMemberState;

    fn validate(&self) -> Result<()> {
        require("database", &self.database)?;
        require("role", &self.role)?;
        require("member", &self.member)
    }

    fn describe(&self) -> String {
        format!("{} in role {} of {}", self.member, self.role, self.database)
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<DatabaseRoleMemberState> {
        add(
            catalog,
            RoleScope::Database(self.database.clone()),
            &self.role,
            &self.member,
        )?;
        Ok(DatabaseRoleMemberState {
            database: self.database.clone(),
            role: self.role.clone(),
            member: self.member.clone(),
        })
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<DatabaseRoleMemberState>> {
        let state = DatabaseRoleMemberState {
            database: self.database.clone(),
            role: self.role.clone(),
            member: self.member.clone(),
        };
        state.refresh(catalog)
    }

    fn changes(&self, state: &DatabaseRoleMemberState) -> Changes {
        Changes::new()
            .identity("database", state.database != self.database)
            .identity("role", state.role != self.role)
            .identity("member", state.member != self.member)
    }

    fn converge(
        &self,
        state: &DatabaseRoleMemberState,
        _catalog: &dyn Catalog,
    ) -> Result<DatabaseRoleMemberState> {
        Ok(state.clone())
    }
}

impl Tracked for DatabaseRoleMemberState {
    fn summary(&self) -> String {
        format!("{} in role {} of {}", self.member, self.role, self.database)
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        if !database_exists(catalog, &self.database)? {
            return Ok(None);
        }
        let scope = RoleScope::Database(self.database.clone());
        let present = catalog.is_role_member(&scope, &self.role, &self.member)?;
        Ok(present.then(|| self.clone()))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        remove(
            catalog,
            RoleScope::Database(self.database.clone()),
            &self.role,
            &self.member,
        )
    }
}
