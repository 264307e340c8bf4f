//! Database users: SQL users bound to a login, directory users, and
//! directory service principals
//!
//! Users may optionally manage their database role memberships. When
//! `roles` is unset the observed roles are reported but left alone.

use super::{Changes, Declared, Tracked, database_exists, missing, require};
use crate::catalog::{Catalog, Lookup, UserRow};
use crate::command::Command;
use crate::error::Result;
use crate::membership;
use crate::resolve::resolve;
use crate::sid::Sid;
use crate::types::RoleScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn default_schema() -> String {
    "dbo".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlUserSpec {
    pub database: String,
    pub name: String,
    pub login_name: String,
    #[serde(default = "default_schema")]
    pub default_schema: String,
    #[serde(default)]
    pub roles: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlUserState {
    pub id: i32,
    pub database: String,
    pub name: String,
    pub login_name: Option<String>,
    pub default_schema: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalUserSpec {
    pub database: String,
    pub name: String,
    /// Directory object id; unset creates the user from the directory by name
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default = "default_schema")]
    pub default_schema: String,
    #[serde(default)]
    pub roles: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUserState {
    pub id: i32,
    pub database: String,
    pub name: String,
    pub sid: Option<String>,
    pub default_schema: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicePrincipalSpec {
    pub database: String,
    pub name: String,
    /// Application (client) id of the principal
    pub client_id: String,
    #[serde(default = "default_schema")]
    pub default_schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePrincipalState {
    pub id: i32,
    pub database: String,
    pub name: String,
    pub sid: Option<String>,
    pub default_schema: String,
}

fn observed_roles(catalog: &dyn Catalog, database: &str, member: &str) -> Result<BTreeSet<String>> {
    Ok(catalog.member_roles(database, member)?.into_iter().collect())
}

/// Converge role memberships when the caller manages them.
fn sync_roles(
    catalog: &dyn Catalog,
    database: &str,
    member: &str,
    desired: Option<&BTreeSet<String>>,
    observed: &BTreeSet<String>,
) -> Result<()> {
    let Some(desired) = desired else {
        return Ok(());
    };
    let delta = membership::diff(desired, observed);
    for command in delta.commands(&RoleScope::Database(database.to_string()), member) {
        catalog.execute(&command)?;
    }
    Ok(())
}

fn read_user(catalog: &dyn Catalog, database: &str, name: &str) -> Result<UserRow> {
    catalog
        .user(database, Lookup::Name(name))?
        .ok_or_else(|| missing("user", format!("{database}.{name}")))
}

fn refresh_user(
    catalog: &dyn Catalog,
    database: &str,
    id: i32,
    name: &str,
) -> Result<Option<UserRow>> {
    if !database_exists(catalog, database)? {
        log::info!("Database {database} is gone, so is user {name}");
        return Ok(None);
    }
    Ok(resolve(Some(id), name, |l| catalog.user(database, l))?.into_entity())
}

fn drop_user(catalog: &dyn Catalog, database: &str, name: &str) -> Result<()> {
    catalog.execute(&Command::DropUser {
        database: database.to_string(),
        name: name.to_string(),
    })
}

fn alter_default_schema(
    catalog: &dyn Catalog,
    database: &str,
    name: &str,
    schema: &str,
) -> Result<()> {
    catalog.execute(&Command::AlterUserDefaultSchema {
        database: database.to_string(),
        name: name.to_string(),
        default_schema: schema.to_string(),
    })
}

fn roles_changed(desired: Option<&BTreeSet<String>>, observed: &BTreeSet<String>) -> bool {
    desired.is_some_and(|roles| roles != observed)
}

fn sid_matches(guid: &str, observed: Option<&str>) -> bool {
    Sid::from_guid(guid).is_ok_and(|sid| Some(sid.to_string().as_str()) == observed)
}

impl SqlUserState {
    fn from_row(catalog: &dyn Catalog, database: &str, row: UserRow) -> Result<Self> {
        let roles = observed_roles(catalog, database, &row.name)?;
        Ok(Self {
            id: row.id,
            database: database.to_string(),
            name: row.name,
            login_name: row.login_name,
            default_schema: row.default_schema,
            roles,
        })
    }
}

impl Declared for SqlUserSpec {
    type State = SqlUserState;

    fn validate(&self) -> Result<()> {
        require("database", &self.database)?;
        require("user name", &self.name)?;
        require("login name", &self.login_name)?;
        require("default schema", &self.default_schema)
    }

    fn describe(&self) -> String {
        format!(
            "user {} in {} for login {}",
            self.name, self.database, self.login_name
        )
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<SqlUserState> {
        catalog.execute(&Command::CreateUserForLogin {
            database: self.database.clone(),
            name: self.name.clone(),
            login: self.login_name.clone(),
            default_schema: self.default_schema.clone(),
        })?;
        sync_roles(
            catalog,
            &self.database,
            &self.name,
            self.roles.as_ref(),
            &BTreeSet::new(),
        )?;
        let row = read_user(catalog, &self.database, &self.name)?;
        SqlUserState::from_row(catalog, &self.database, row)
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<SqlUserState>> {
        catalog
            .user(&self.database, Lookup::Name(&self.name))?
            .map(|row| SqlUserState::from_row(catalog, &self.database, row))
            .transpose()
    }

    fn changes(&self, state: &SqlUserState) -> Changes {
        Changes::new()
            .identity("database", state.database != self.database)
            .identity("name", state.name != self.name)
            .identity(
                "login_name",
                state.login_name.as_deref() != Some(self.login_name.as_str()),
            )
            .mutable("default_schema", state.default_schema != self.default_schema)
            .mutable("roles", roles_changed(self.roles.as_ref(), &state.roles))
    }

    fn converge(&self, state: &SqlUserState, catalog: &dyn Catalog) -> Result<SqlUserState> {
        if state.default_schema != self.default_schema {
            alter_default_schema(catalog, &self.database, &self.name, &self.default_schema)?;
        }
        let observed = observed_roles(catalog, &self.database, &self.name)?;
        sync_roles(catalog, &self.database, &self.name, self.roles.as_ref(), &observed)?;

        let row = read_user(catalog, &self.database, &self.name)?;
        SqlUserState::from_row(catalog, &self.database, row)
    }
}

impl Tracked for SqlUserState {
    fn summary(&self) -> String {
        format!("user {} in {}", self.name, self.database)
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        refresh_user(catalog, &self.database, self.id, &self.name)?
            .map(|row| Self::from_row(catalog, &self.database, row))
            .transpose()
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        drop_user(catalog, &self.database, &self.name)
    }
}

impl ExternalUserState {
    fn from_row(catalog: &dyn Catalog, database: &str, row: UserRow) -> Result<Self> {
        let roles = observed_roles(catalog, database, &row.name)?;
        Ok(Self {
            id: row.id,
            database: database.to_string(),
            name: row.name,
            sid: row.sid,
            default_schema: row.default_schema,
            roles,
        })
    }
}

impl ExternalUserSpec {
    fn sid(&self) -> Result<Option<Sid>> {
        self.object_id.as_deref().map(Sid::from_guid).transpose()
    }
}

impl Declared for ExternalUserSpec {
    type State = ExternalUserState;

    fn validate(&self) -> Result<()> {
        require("database", &self.database)?;
        require("user name", &self.name)?;
        require("default schema", &self.default_schema)?;
        self.sid().map(|_| ())
    }

    fn describe(&self) -> String {
        match &self.object_id {
            Some(object_id) => format!(
                "external user {} in {} (object {object_id})",
                self.name, self.database
            ),
            None => format!("external user {} in {}", self.name, self.database),
        }
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<ExternalUserState> {
        catalog.execute(&Command::CreateExternalUser {
            database: self.database.clone(),
            name: self.name.clone(),
            sid: self.sid()?,
            default_schema: self.default_schema.clone(),
        })?;
        sync_roles(
            catalog,
            &self.database,
            &self.name,
            self.roles.as_ref(),
            &BTreeSet::new(),
        )?;
        let row = read_user(catalog, &self.database, &self.name)?;
        ExternalUserState::from_row(catalog, &self.database, row)
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<ExternalUserState>> {
        catalog
            .user(&self.database, Lookup::Name(&self.name))?
            .map(|row| ExternalUserState::from_row(catalog, &self.database, row))
            .transpose()
    }

    fn changes(&self, state: &ExternalUserState) -> Changes {
        // Users created from the directory by name have whatever SID it assigned
        let sid_changed = self
            .object_id
            .as_deref()
            .is_some_and(|guid| !sid_matches(guid, state.sid.as_deref()));

        Changes::new()
            .identity("database", state.database != self.database)
            .identity("name", state.name != self.name)
            .identity("object_id", sid_changed)
            .mutable("default_schema", state.default_schema != self.default_schema)
            .mutable("roles", roles_changed(self.roles.as_ref(), &state.roles))
    }

    fn converge(
        &self,
        state: &ExternalUserState,
        catalog: &dyn Catalog,
    ) -> Result<ExternalUserState> {
        if state.default_schema != self.default_schema {
            alter_default_schema(catalog, &self.database, &self.name, &self.default_schema)?;
        }
        let observed = observed_roles(catalog, &self.database, &self.name)?;
        sync_roles(catalog, &self.database, &self.name, self.roles.as_ref(), &observed)?;

        let row = read_user(catalog, &self.database, &self.name)?;
        ExternalUserState::from_row(catalog, &self.database, row)
    }
}

impl Tracked for ExternalUserState {
    fn summary(&self) -> String {
        format!("external user {} in {}", self.name, self.database)
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        refresh_user(catalog, &self.database, self.id, &self.name)?
            .map(|row| Self::from_row(catalog, &self.database, row))
            .transpose()
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        drop_user(catalog, &self.database, &self.name)
    }
}

impl ServicePrincipalState {
    fn from_row(database: &str, row: UserRow) -> Self {
        Self {
            id: row.id,
            database: database.to_string(),
            name: row.name,
            sid: row.sid,
            default_schema: row.default_schema,
        }
    }
}

impl Declared for ServicePrincipalSpec {
    type State = ServicePrincipalState;

    fn validate(&self) -> Result<()> {
        require("database", &self.database)?;
        require("principal name", &self.name)?;
        require("default schema", &self.default_schema)?;
        Sid::from_guid(&self.client_id).map(|_| ())
    }

    fn describe(&self) -> String {
        format!(
            "service principal {} in {} (client {})",
            self.name, self.database, self.client_id
        )
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<ServicePrincipalState> {
        catalog.execute(&Command::CreateExternalUser {
            database: self.database.clone(),
            name: self.name.clone(),
            sid: Some(Sid::from_guid(&self.client_id)?),
            default_schema: self.default_schema.clone(),
        })?;
        let row = read_user(catalog, &self.database, &self.name)?;
        Ok(ServicePrincipalState::from_row(&self.database, row))
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<ServicePrincipalState>> {
        Ok(catalog
            .user(&self.database, Lookup::Name(&self.name))?
            .map(|row| ServicePrincipalState::from_row(&self.database, row)))
    }

    fn changes(&self, state: &ServicePrincipalState) -> Changes {
        Changes::new()
            .identity("database", state.database != self.database)
            .identity("name", state.name != self.name)
            .identity(
                "client_id",
                !sid_matches(&self.client_id, state.sid.as_deref()),
            )
            .mutable("default_schema", state.default_schema != self.default_schema)
    }

    fn converge(
        &self,
        state: &ServicePrincipalState,
        catalog: &dyn Catalog,
    ) -> Result<ServicePrincipalState> {
        if state.default_schema != self.default_schema {
            alter_default_schema(catalog, &self.database, &self.name, &self.default_schema)?;
        }
        let row = read_user(catalog, &self.database, &self.name)?;
        Ok(ServicePrincipalState::from_row(&self.database, row))
    }
}

impl Tracked for ServicePrincipalState {
    fn summary(&self) -> String {
        format!("service principal {} in {}", self.name, self.database)
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        Ok(refresh_user(catalog, &self.database, self.id, &self.name)?
            .map(|row| Self::from_row(&self.database, row)))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        drop_user(catalog, &self.database, &self.name)
    }
}
