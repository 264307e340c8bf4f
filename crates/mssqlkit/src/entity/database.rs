//! Databases

use super::{Changes, Declared, Tracked, missing, require};
use crate::catalog::{Catalog, DatabaseRow, Lookup};
use crate::command::Command;
use crate::error::Result;
use crate::resolve::resolve;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseState {
    pub id: i32,
    pub name: String,
}

impl From<DatabaseRow> for DatabaseState {
    fn from(row: DatabaseRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

fn read(catalog: &dyn Catalog, name: &str) -> Result<DatabaseState> {
    catalog
        .database(Lookup::Name(name))?
        .map(DatabaseState::from)
        .ok_or_else(|| missing("database", name))
}

impl Declared for DatabaseSpec {
    type State = DatabaseState;

    fn validate(&self) -> Result<()> {
        require("database name", &self.name)
    }

    fn describe(&self) -> String {
        format!("database {}", self.name)
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<DatabaseState> {
        catalog.execute(&Command::CreateDatabase {
            name: self.name.clone(),
        })?;
        read(catalog, &self.name)
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<DatabaseState>> {
        Ok(catalog
            .database(Lookup::Name(&self.name))?
            .map(DatabaseState::from))
    }

    fn changes(&self, state: &DatabaseState) -> Changes {
        Changes::new().identity("name", state.name != self.name)
    }

    fn converge(&self, state: &DatabaseState, catalog: &dyn Catalog) -> Result<DatabaseState> {
        read(catalog, &state.name)
    }
}

impl Tracked for DatabaseState {
    fn summary(&self) -> String {
        format!("database {} (id {})", self.name, self.id)
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        Ok(resolve(Some(self.id), &self.name, |l| catalog.database(l))?
            .into_entity()
            .map(Self::from))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        // Best effort; the drop fails on its own if sessions remain
        if let Err(e) = catalog.execute(&Command::SetSingleUser {
            database: self.name.clone(),
        }) {
            log::warn!("Could not set {} to single-user mode: {e}", self.name);
        }
        catalog.execute(&Command::DropDatabase {
            name: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;

    fn spec() -> DatabaseSpec {
        DatabaseSpec { name: "app".into() }
    }

    #[test]
    fn test_create_and_refresh() {
        let engine = MemoryEngine::new();
        let state = spec().create(&engine).unwrap();
        assert_eq!(state.name, "app");
        assert_eq!(state.refresh(&engine).unwrap(), Some(state.clone()));
        assert!(!spec().changes(&state).into_diff().is_change());
    }

    #[test]
    fn test_refresh_heals_recreated_database() {
        let engine = MemoryEngine::new();
        let state = spec().create(&engine).unwrap();
        engine
            .execute(&Command::DropDatabase { name: "app".into() })
            .unwrap();
        engine
            .execute(&Command::CreateDatabase { name: "app".into() })
            .unwrap();

        let healed = state.refresh(&engine).unwrap().unwrap();
        assert_ne!(healed.id, state.id);
    }

    #[test]
    fn test_destroy_proceeds_when_single_user_fails() {
        let engine = MemoryEngine::new();
        let state = spec().create(&engine).unwrap();
        engine.fail_when("SINGLE_USER", "ALTER DATABASE failed.");

        state.destroy(&engine).unwrap();
        assert_eq!(state.refresh(&engine).unwrap(), None);
        let sql = engine.statements();
        assert!(sql[sql.len() - 2].contains("SINGLE_USER"));
        assert!(sql[sql.len() - 1].starts_with("DROP DATABASE"));
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        assert!(DatabaseSpec { name: "  ".into() }.validate().is_err());
    }
}
