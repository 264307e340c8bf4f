use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::Ledger;
use mssqlkit::EntityState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Tracked entities between runs
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct StateFile {
    /// Last time the state was written
    pub last_updated: Option<DateTime<Utc>>,

    /// Observed records in manifest order
    #[serde(default)]
    pub ledger: Ledger<EntityState>,
}

// ============================================================================
// Persistence
// ============================================================================

/// Default ledger location: `.aclsync/state.toml` beside the manifest
pub fn default_path(manifest: &Path) -> PathBuf {
    manifest
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(".aclsync")
        .join("state.toml")
}

impl StateFile {
    /// Load state, or an empty ledger when nothing was saved yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No state at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read state file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Could not parse state file {}", path.display()))
    }

    /// Save state, stamping `last_updated`
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }

        self.last_updated = Some(Utc::now());
        let content = toml::to_string_pretty(self).context("Could not serialize state")?;
        fs::write(path, content)
            .with_context(|| format!("Could not write state file {}", path.display()))?;

        log::debug!("Saved {} tracked entities to {}", self.ledger.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssqlkit::entity::{DatabaseState, LoginState};
    use tempfile::TempDir;

    fn ledger() -> Ledger<EntityState> {
        let mut ledger = Ledger::new();
        ledger.upsert(
            "database.app",
            EntityState::from(DatabaseState {
                id: 5,
                name: "app".into(),
            }),
        );
        ledger.upsert(
            "sql_login.app",
            EntityState::from(LoginState {
                id: 101,
                name: "app".into(),
                default_database: "app".into(),
                default_language: "us_english".into(),
                check_expiration: false,
                check_policy: true,
                disabled: false,
                password_digest: "abc".into(),
            }),
        );
        ledger
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::load(&dir.path().join("state.toml")).unwrap();
        assert!(state.ledger.is_empty());
        assert!(state.last_updated.is_none());
    }

    #[test]
    fn test_save_and_load_keeps_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".aclsync").join("state.toml");

        let mut state = StateFile {
            last_updated: None,
            ledger: ledger(),
        };
        state.save(&path).unwrap();
        assert!(state.last_updated.is_some());

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.ledger, ledger());
        assert_eq!(
            loaded.ledger.addresses().collect::<Vec<_>>(),
            vec!["database.app", "sql_login.app"]
        );
    }

    #[test]
    fn test_password_never_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        let mut state = StateFile {
            last_updated: None,
            ledger: ledger(),
        };
        state.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("password_digest"));
        assert!(!content.contains("password ="));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "ledger = 3").unwrap();
        assert!(StateFile::load(&path).is_err());
    }

    #[test]
    fn test_default_path_beside_manifest() {
        assert_eq!(
            default_path(Path::new("/srv/acl/aclsync.toml")),
            PathBuf::from("/srv/acl/.aclsync/state.toml")
        );
        assert_eq!(
            default_path(Path::new("aclsync.toml")),
            PathBuf::from(".aclsync/state.toml")
        );
    }
}
