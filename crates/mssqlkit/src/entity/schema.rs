//! Schemas and their owners

use super::{Changes, Declared, Tracked, database_exists, missing, require};
use crate::catalog::{Catalog, Lookup, SchemaRow};
use crate::command::Command;
use crate::error::Result;
use crate::resolve::resolve;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSpec {
    pub database: String,
    pub name: String,
    /// Unset leaves ownership with `dbo`
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaState {
    pub id: i32,
    pub database: String,
    pub name: String,
    pub owner: String,
}

impl SchemaState {
    fn from_row(database: &str, row: SchemaRow) -> Self {
        Self {
            id: row.id,
            database: database.to_string(),
            name: row.name,
            owner: row.owner,
        }
    }
}

impl SchemaSpec {
    fn read(&self, catalog: &dyn Catalog) -> Result<SchemaState> {
        catalog
            .schema(&self.database, Lookup::Name(&self.name))?
            .map(|row| SchemaState::from_row(&self.database, row))
            .ok_or_else(|| missing("schema", format!("{}.{}", self.database, self.name)))
    }

    fn owner_changed(&self, state: &SchemaState) -> bool {
        self.owner.as_ref().is_some_and(|owner| *owner != state.owner)
    }
}

impl Declared for SchemaSpec {
    type State = SchemaState;

    fn validate(&self) -> Result<()> {
        require("database", &self.database)?;
        require("schema name", &self.name)
    }

    fn describe(&self) -> String {
        match &self.owner {
            Some(owner) => format!(
                "schema {} in {} owned by {owner}",
                self.name, self.database
            ),
            None => format!("schema {} in {}", self.name, self.database),
        }
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<SchemaState> {
        catalog.execute(&Command::CreateSchema {
            database: self.database.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
        })?;
        self.read(catalog)
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<SchemaState>> {
        Ok(catalog
            .schema(&self.database, Lookup::Name(&self.name))?
            .map(|row| SchemaState::from_row(&self.database, row)))
    }

    fn changes(&self, state: &SchemaState) -> Changes {
        Changes::new()
            .identity("database", state.database != self.database)
            .identity("name", state.name != self.name)
            .mutable("owner", self.owner_changed(state))
    }

    fn converge(&self, state: &SchemaState, catalog: &dyn Catalog) -> Result<SchemaState> {
        if let Some(owner) = &self.owner
            && self.owner_changed(state)
        {
            catalog.execute(&Command::AlterSchemaOwner {
                database: self.database.clone(),
                name: self.name.clone(),
                owner: owner.clone(),
            })?;
        }
        self.read(catalog)
    }
}

impl Tracked for SchemaState {
    fn summary(&self) -> String {
        format!(
            "schema {} in {} (owner {})",
            self.name, self.database, self.owner
        )
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        if !database_exists(catalog, &self.database)? {
            return Ok(None);
        }
        Ok(
            resolve(Some(self.id), &self.name, |l| catalog.schema(&self.database, l))?
                .into_entity()
                .map(|row| Self::from_row(&self.database, row)),
        )
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        catalog.execute(&Command::DropSchema {
            database: self.database.clone(),
            name: self.name.clone(),
        })
    }
}
