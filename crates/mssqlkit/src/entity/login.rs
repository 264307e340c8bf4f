//! SQL logins
//!
//! Passwords cannot be read back from the engine. Tracked state keeps a
//! keyed digest instead so a changed password is still detected.

use super::{Changes, Declared, Tracked, missing, require};
use crate::catalog::{Catalog, Lookup, LoginRow};
use crate::command::{Command, LoginOption};
use crate::error::Result;
use crate::resolve::resolve;
use serde::{Deserialize, Serialize};

fn default_database() -> String {
    "master".to_string()
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginSpec {
    pub name: String,
    pub password: String,
    #[serde(default = "default_database")]
    pub default_database: String,
    /// Unset keeps whatever the engine assigns
    #[serde(default)]
    pub default_language: Option<String>,
    #[serde(default)]
    pub check_expiration: bool,
    #[serde(default = "enabled")]
    pub check_policy: bool,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    pub id: i32,
    pub name: String,
    pub default_database: String,
    pub default_language: String,
    pub check_expiration: bool,
    pub check_policy: bool,
    pub disabled: bool,
    /// Empty when the password was never set through this tool
    #[serde(default)]
    pub password_digest: String,
}

/// Digest of a login's password, keyed by the login name.
pub fn password_digest(name: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(&[0]);
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

impl LoginState {
    fn from_row(row: LoginRow, password_digest: String) -> Self {
        Self {
            id: row.id,
            name: row.name,
            default_database: row.default_database,
            default_language: row.default_language,
            check_expiration: row.check_expiration,
            check_policy: row.check_policy,
            disabled: row.is_disabled,
            password_digest,
        }
    }
}

impl LoginSpec {
    fn digest(&self) -> String {
        password_digest(&self.name, &self.password)
    }

    fn read(&self, catalog: &dyn Catalog) -> Result<LoginState> {
        catalog
            .login(Lookup::Name(&self.name))?
            .map(|row| LoginState::from_row(row, self.digest()))
            .ok_or_else(|| missing("login", &self.name))
    }
}

impl Declared for LoginSpec {
    type State = LoginState;

    fn validate(&self) -> Result<()> {
        require("login name", &self.name)?;
        require("login password", &self.password)?;
        require("default database", &self.default_database)
    }

    fn describe(&self) -> String {
        format!("login {}", self.name)
    }

    fn create(&self, catalog: &dyn Catalog) -> Result<LoginState> {
        catalog.execute(&Command::CreateLogin {
            name: self.name.clone(),
            password: self.password.clone(),
            default_database: self.default_database.clone(),
            default_language: self.default_language.clone(),
            check_expiration: self.check_expiration,
            check_policy: self.check_policy,
        })?;
        if self.disabled {
            catalog.execute(&Command::SetLoginEnabled {
                name: self.name.clone(),
                enabled: false,
            })?;
        }
        self.read(catalog)
    }

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<LoginState>> {
        Ok(catalog
            .login(Lookup::Name(&self.name))?
            .map(|row| LoginState::from_row(row, String::new())))
    }

    fn changes(&self, state: &LoginState) -> Changes {
        let language_changed = self
            .default_language
            .as_ref()
            .is_some_and(|lang| *lang != state.default_language);

        Changes::new()
            .identity("name", state.name != self.name)
            .mutable("password", state.password_digest != self.digest())
            .mutable(
                "default_database",
                state.default_database != self.default_database,
            )
            .mutable("default_language", language_changed)
            .mutable(
                "check_expiration",
                state.check_expiration != self.check_expiration,
            )
            .mutable("check_policy", state.check_policy != self.check_policy)
            .mutable("disabled", state.disabled != self.disabled)
    }

    fn converge(&self, state: &LoginState, catalog: &dyn Catalog) -> Result<LoginState> {
        let changes = self.changes(state);

        if changes.has("password") {
            catalog.execute(&Command::AlterLoginPassword {
                name: self.name.clone(),
                password: self.password.clone(),
            })?;
        }

        let mut options = Vec::new();
        if changes.has("default_database") {
            options.push(LoginOption::DefaultDatabase(self.default_database.clone()));
        }
        if let Some(lang) = &self.default_language
            && changes.has("default_language")
        {
            options.push(LoginOption::DefaultLanguage(lang.clone()));
        }
        if changes.has("check_policy") {
            options.push(LoginOption::CheckPolicy(self.check_policy));
        }
        if changes.has("check_expiration") {
            options.push(LoginOption::CheckExpiration(self.check_expiration));
        }
        if !options.is_empty() {
            catalog.execute(&Command::AlterLoginOptions {
                name: self.name.clone(),
                options,
            })?;
        }

        if changes.has("disabled") {
            catalog.execute(&Command::SetLoginEnabled {
                name: self.name.clone(),
                enabled: !self.disabled,
            })?;
        }

        self.read(catalog)
    }
}

impl Tracked for LoginState {
    fn summary(&self) -> String {
        let status = if self.disabled { ", disabled" } else { "" };
        format!(
            "login {} (default database {}{status})",
            self.name, self.default_database
        )
    }

    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>> {
        Ok(resolve(Some(self.id), &self.name, |l| catalog.login(l))?
            .into_entity()
            .map(|row| Self::from_row(row, self.password_digest.clone())))
    }

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()> {
        catalog.execute(&Command::DropLogin {
            name: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;

    fn spec() -> LoginSpec {
        LoginSpec {
            name: "app".into(),
            password: "Secret-123".into(),
            default_database: default_database(),
            default_language: None,
            check_expiration: false,
            check_policy: true,
            disabled: false,
        }
    }

    #[test]
    fn test_manifest_defaults() {
        let spec: LoginSpec = toml::from_str(
            r#"
            name = "app"
            password = "Secret-123"
            "#,
        )
        .unwrap();
        assert_eq!(spec, self::spec());
    }

    #[test]
    fn test_create_reads_back_engine_language() {
        let engine = MemoryEngine::new();
        let state = spec().create(&engine).unwrap();
        assert_eq!(state.default_language, "us_english");
        assert_eq!(state.password_digest, spec().digest());
        assert!(!spec().changes(&state).into_diff().is_change());
    }

    #[test]
    fn test_create_disabled() {
        let engine = MemoryEngine::new();
        let mut spec = spec();
        spec.disabled = true;
        let state = spec.create(&engine).unwrap();
        assert!(state.disabled);
        assert!(engine.statements()[1].ends_with("DISABLE"));
    }

    #[test]
    fn test_password_change_detected_and_converged() {
        let engine = MemoryEngine::new();
        let state = spec().create(&engine).unwrap();

        let mut next = spec();
        next.password = "Rotated-456".into();
        assert_eq!(
            next.changes(&state).into_diff(),
            declarative::Diff::Update {
                attributes: vec!["password".into()]
            }
        );

        engine.clear_log();
        let state = next.converge(&state, &engine).unwrap();
        assert_eq!(engine.login_password("app").as_deref(), Some("Rotated-456"));
        assert_eq!(engine.commands().len(), 1);
        assert!(!next.changes(&state).into_diff().is_change());
    }

    #[test]
    fn test_options_converge_in_one_statement() {
        let engine = MemoryEngine::new().with_database("app_db");
        let state = spec().create(&engine).unwrap();

        let mut next = spec();
        next.default_database = "app_db".into();
        next.check_policy = false;
        next.default_language = Some("British".into());
        engine.clear_log();
        let state = next.converge(&state, &engine).unwrap();

        assert_eq!(
            engine.statements(),
            vec![
                "ALTER LOGIN [app] WITH DEFAULT_DATABASE = [app_db], DEFAULT_LANGUAGE = [British], CHECK_POLICY = OFF"
            ]
        );
        assert_eq!(state.default_language, "British");
        engine.clear_log();
        next.converge(&state, &engine).unwrap();
        assert!(engine.commands().is_empty());
    }

    #[test]
    fn test_imported_login_resets_password_once() {
        let engine = MemoryEngine::new();
        spec().create(&engine).unwrap();
        let imported = spec().import(&engine).unwrap().unwrap();
        assert!(imported.password_digest.is_empty());
        assert!(spec().changes(&imported).has("password"));
    }

    #[test]
    fn test_refresh_keeps_digest_and_heals_id() {
        let engine = MemoryEngine::new();
        let state = spec().create(&engine).unwrap();
        state.destroy(&engine).unwrap();
        spec().create(&engine).unwrap();

        let healed = state.refresh(&engine).unwrap().unwrap();
        assert_ne!(healed.id, state.id);
        assert_eq!(healed.password_digest, state.password_digest);
    }

    #[test]
    fn test_digest_is_keyed_by_name() {
        assert_ne!(password_digest("a", "pw"), password_digest("b", "pw"));
        assert_eq!(password_digest("a", "pw"), password_digest("a", "pw"));
    }
}
