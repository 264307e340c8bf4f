//! Typed DDL/DCL statements and their T-SQL rendering.
//!
//! Every statement the reconciler emits is a [`Command`]. Identifiers are
//! bracket-quoted, literals are `N'...'` strings, and permission names are
//! restricted to upper-case words, so rendering never needs parameters.

use crate::error::{Error, Result};
use crate::sid::Sid;
use crate::types::{RoleScope, ScopeLocator, Target};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote an identifier as `[name]`, doubling any `]`.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal as `N'value'`, doubling any `'`.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

const REDACTED: &str = "N'***'";

/// A validated permission name such as `SELECT` or `VIEW DEFINITION`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Normalize to upper case and reject anything but letters and single spaces.
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();

        if normalized.is_empty() {
            return Err(Error::InvalidInput("permission name is empty".into()));
        }
        if !normalized.chars().all(|c| c.is_ascii_uppercase() || c == ' ') {
            return Err(Error::InvalidInput(format!(
                "permission name '{name}' may only contain letters and spaces"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Permission {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `ALTER LOGIN ... WITH` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOption {
    DefaultDatabase(String),
    DefaultLanguage(String),
    CheckExpiration(bool),
    CheckPolicy(bool),
}

impl LoginOption {
    fn render(&self) -> String {
        match self {
            LoginOption::DefaultDatabase(db) => format!("DEFAULT_DATABASE = {}", quote_ident(db)),
            LoginOption::DefaultLanguage(lang) => {
                format!("DEFAULT_LANGUAGE = {}", quote_ident(lang))
            }
            LoginOption::CheckExpiration(on) => format!("CHECK_EXPIRATION = {}", on_off(*on)),
            LoginOption::CheckPolicy(on) => format!("CHECK_POLICY = {}", on_off(*on)),
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "ON" } else { "OFF" }
}

/// A statement the reconciler can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateDatabase {
        name: String,
    },
    /// Kick other sessions out ahead of a drop
    SetSingleUser {
        database: String,
    },
    DropDatabase {
        name: String,
    },
    CreateLogin {
        name: String,
        password: String,
        default_database: String,
        default_language: Option<String>,
        check_expiration: bool,
        check_policy: bool,
    },
    AlterLoginPassword {
        name: String,
        password: String,
    },
    AlterLoginOptions {
        name: String,
        options: Vec<LoginOption>,
    },
    SetLoginEnabled {
        name: String,
        enabled: bool,
    },
    DropLogin {
        name: String,
    },
    CreateUserForLogin {
        database: String,
        name: String,
        login: String,
        default_schema: String,
    },
    /// External user, by SID when known, otherwise resolved by the directory
    CreateExternalUser {
        database: String,
        name: String,
        sid: Option<Sid>,
        default_schema: String,
    },
    AlterUserDefaultSchema {
        database: String,
        name: String,
        default_schema: String,
    },
    DropUser {
        database: String,
        name: String,
    },
    CreateRole {
        scope: RoleScope,
        name: String,
        owner: Option<String>,
    },
    AlterRoleOwner {
        scope: RoleScope,
        name: String,
        owner: String,
    },
    DropRole {
        scope: RoleScope,
        name: String,
    },
    AddRoleMember {
        scope: RoleScope,
        role: String,
        member: String,
    },
    DropRoleMember {
        scope: RoleScope,
        role: String,
        member: String,
    },
    CreateSchema {
        database: String,
        name: String,
        owner: Option<String>,
    },
    AlterSchemaOwner {
        database: String,
        name: String,
        owner: String,
    },
    DropSchema {
        database: String,
        name: String,
    },
    Grant {
        scope: ScopeLocator,
        permission: Permission,
        principal: String,
        with_grant_option: bool,
    },
    Revoke {
        scope: ScopeLocator,
        permission: Permission,
        principal: String,
        cascade: bool,
    },
}

impl Command {
    /// Connection scope the statement must run in.
    pub fn target(&self) -> Target {
        match self {
            Command::CreateDatabase { .. }
            | Command::SetSingleUser { .. }
            | Command::DropDatabase { .. }
            | Command::CreateLogin { .. }
            | Command::AlterLoginPassword { .. }
            | Command::AlterLoginOptions { .. }
            | Command::SetLoginEnabled { .. }
            | Command::DropLogin { .. } => Target::Server,
            Command::CreateUserForLogin { database, .. }
            | Command::CreateExternalUser { database, .. }
            | Command::AlterUserDefaultSchema { database, .. }
            | Command::DropUser { database, .. }
            | Command::CreateSchema { database, .. }
            | Command::AlterSchemaOwner { database, .. }
            | Command::DropSchema { database, .. } => Target::Database(database.clone()),
            Command::CreateRole { scope, .. }
            | Command::AlterRoleOwner { scope, .. }
            | Command::DropRole { scope, .. }
            | Command::AddRoleMember { scope, .. }
            | Command::DropRoleMember { scope, .. } => scope.target(),
            Command::Grant { scope, .. } | Command::Revoke { scope, .. } => scope.target(),
        }
    }

    /// Full T-SQL text, secrets included.
    pub fn to_sql(&self) -> String {
        self.render(false)
    }

    /// T-SQL text with password literals masked, for logs and errors.
    pub fn redacted(&self) -> String {
        self.render(true)
    }

    fn render(&self, redact: bool) -> String {
        let secret = |password: &str| {
            if redact {
                REDACTED.to_string()
            } else {
                quote_literal(password)
            }
        };

        match self {
            Command::CreateDatabase { name } => format!("CREATE DATABASE {}", quote_ident(name)),
            Command::SetSingleUser { database } => format!(
                "ALTER DATABASE {} SET SINGLE_USER WITH ROLLBACK IMMEDIATE",
                quote_ident(database)
            ),
            Command::DropDatabase { name } => {
                format!("DROP DATABASE IF EXISTS {}", quote_ident(name))
            }
            Command::CreateLogin {
                name,
                password,
                default_database,
                default_language,
                check_expiration,
                check_policy,
            } => {
                let mut sql = format!(
                    "CREATE LOGIN {} WITH PASSWORD = {}, DEFAULT_DATABASE = {}, CHECK_EXPIRATION = {}, CHECK_POLICY = {}",
                    quote_ident(name),
                    secret(password),
                    quote_ident(default_database),
                    on_off(*check_expiration),
                    on_off(*check_policy),
                );
                if let Some(lang) = default_language {
                    sql.push_str(&format!(", DEFAULT_LANGUAGE = {}", quote_ident(lang)));
                }
                sql
            }
            Command::AlterLoginPassword { name, password } => format!(
                "ALTER LOGIN {} WITH PASSWORD = {}",
                quote_ident(name),
                secret(password)
            ),
            Command::AlterLoginOptions { name, options } => format!(
                "ALTER LOGIN {} WITH {}",
                quote_ident(name),
                options
                    .iter()
                    .map(LoginOption::render)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Command::SetLoginEnabled { name, enabled } => format!(
                "ALTER LOGIN {} {}",
                quote_ident(name),
                if *enabled { "ENABLE" } else { "DISABLE" }
            ),
            Command::DropLogin { name } => format!("DROP LOGIN {}", quote_ident(name)),
            Command::CreateUserForLogin {
                name,
                login,
                default_schema,
                ..
            } => format!(
                "CREATE USER {} FOR LOGIN {} WITH DEFAULT_SCHEMA = {}",
                quote_ident(name),
                quote_ident(login),
                quote_ident(default_schema)
            ),
            Command::CreateExternalUser {
                name,
                sid: Some(sid),
                default_schema,
                ..
            } => format!(
                "CREATE USER {} WITH SID = {sid}, TYPE = E, DEFAULT_SCHEMA = {}",
                quote_ident(name),
                quote_ident(default_schema)
            ),
            Command::CreateExternalUser {
                name,
                sid: None,
                default_schema,
                ..
            } => format!(
                "CREATE USER {} FROM EXTERNAL PROVIDER WITH DEFAULT_SCHEMA = {}",
                quote_ident(name),
                quote_ident(default_schema)
            ),
            Command::AlterUserDefaultSchema {
                name,
                default_schema,
                ..
            } => format!(
                "ALTER USER {} WITH DEFAULT_SCHEMA = {}",
                quote_ident(name),
                quote_ident(default_schema)
            ),
            Command::DropUser { name, .. } => format!("DROP USER IF EXISTS {}", quote_ident(name)),
            Command::CreateRole { scope, name, owner } => {
                let mut sql = format!("CREATE {} {}", scope.keyword(), quote_ident(name));
                if let Some(owner) = owner {
                    sql.push_str(&format!(" AUTHORIZATION {}", quote_ident(owner)));
                }
                sql
            }
            Command::AlterRoleOwner { scope, name, owner } => format!(
                "ALTER AUTHORIZATION ON {}::{} TO {}",
                scope.keyword(),
                quote_ident(name),
                quote_ident(owner)
            ),
            Command::DropRole { scope, name } => match scope {
                RoleScope::Server => format!("DROP SERVER ROLE {}", quote_ident(name)),
                RoleScope::Database(_) => format!("DROP ROLE IF EXISTS {}", quote_ident(name)),
            },
            Command::AddRoleMember {
                scope,
                role,
                member,
            } => format!(
                "ALTER {} {} ADD MEMBER {}",
                scope.keyword(),
                quote_ident(role),
                quote_ident(member)
            ),
            Command::DropRoleMember {
                scope,
                role,
                member,
            } => format!(
                "ALTER {} {} DROP MEMBER {}",
                scope.keyword(),
                quote_ident(role),
                quote_ident(member)
            ),
            Command::CreateSchema { name, owner, .. } => {
                let mut sql = format!("CREATE SCHEMA {}", quote_ident(name));
                if let Some(owner) = owner {
                    sql.push_str(&format!(" AUTHORIZATION {}", quote_ident(owner)));
                }
                sql
            }
            Command::AlterSchemaOwner { name, owner, .. } => format!(
                "ALTER AUTHORIZATION ON SCHEMA::{} TO {}",
                quote_ident(name),
                quote_ident(owner)
            ),
            Command::DropSchema { name, .. } => {
                format!("DROP SCHEMA IF EXISTS {}", quote_ident(name))
            }
            Command::Grant {
                scope,
                permission,
                principal,
                with_grant_option,
            } => {
                let mut sql = format!(
                    "GRANT {permission}{} TO {}",
                    securable_clause(scope),
                    quote_ident(principal)
                );
                if *with_grant_option {
                    sql.push_str(" WITH GRANT OPTION");
                }
                sql
            }
            Command::Revoke {
                scope,
                permission,
                principal,
                cascade,
            } => {
                let mut sql = format!(
                    "REVOKE {permission}{} FROM {}",
                    securable_clause(scope),
                    quote_ident(principal)
                );
                if *cascade {
                    sql.push_str(" CASCADE");
                }
                sql
            }
        }
    }
}

fn securable_clause(scope: &ScopeLocator) -> String {
    match scope {
        ScopeLocator::Schema { schema, .. } => format!(" ON SCHEMA::{}", quote_ident(schema)),
        ScopeLocator::Server | ScopeLocator::Database { .. } => String::new(),
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_scope() -> ScopeLocator {
        ScopeLocator::Schema {
            database: "app".into(),
            schema: "sales".into(),
        }
    }

    #[test]
    fn test_quote_ident_escapes_brackets() {
        assert_eq!(quote_ident("app"), "[app]");
        assert_eq!(quote_ident("we]ird"), "[we]]ird]");
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("o'brien"), "N'o''brien'");
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!(Permission::parse("select").unwrap().as_str(), "SELECT");
        assert_eq!(
            Permission::parse("  view   definition ").unwrap().as_str(),
            "VIEW DEFINITION"
        );
        assert!(Permission::parse("").is_err());
        assert!(Permission::parse("SELECT; DROP LOGIN sa").is_err());
        assert!(Permission::parse("EXEC2").is_err());
    }

    #[test]
    fn test_create_login_sql() {
        let cmd = Command::CreateLogin {
            name: "app".into(),
            password: "p@ss'word".into(),
            default_database: "master".into(),
            default_language: Some("us_english".into()),
            check_expiration: false,
            check_policy: true,
        };
        assert_eq!(
            cmd.to_sql(),
            "CREATE LOGIN [app] WITH PASSWORD = N'p@ss''word', DEFAULT_DATABASE = [master], CHECK_EXPIRATION = OFF, CHECK_POLICY = ON, DEFAULT_LANGUAGE = [us_english]"
        );
        assert_eq!(cmd.target(), Target::Server);
    }

    #[test]
    fn test_password_redacted_in_display() {
        let cmd = Command::AlterLoginPassword {
            name: "app".into(),
            password: "hunter2".into(),
        };
        assert!(cmd.to_sql().contains("hunter2"));
        assert!(!cmd.to_string().contains("hunter2"));
        assert_eq!(cmd.to_string(), "ALTER LOGIN [app] WITH PASSWORD = N'***'");
    }

    #[test]
    fn test_alter_login_options_sql() {
        let cmd = Command::AlterLoginOptions {
            name: "app".into(),
            options: vec![
                LoginOption::DefaultDatabase("appdb".into()),
                LoginOption::CheckPolicy(false),
            ],
        };
        assert_eq!(
            cmd.to_sql(),
            "ALTER LOGIN [app] WITH DEFAULT_DATABASE = [appdb], CHECK_POLICY = OFF"
        );
    }

    #[test]
    fn test_external_user_sql() {
        let sid = Sid::from_guid("cbb9c7db-2777-47b7-8954-0269ae3dc553").unwrap();
        let with_sid = Command::CreateExternalUser {
            database: "app".into(),
            name: "mi-app".into(),
            sid: Some(sid),
            default_schema: "dbo".into(),
        };
        assert_eq!(
            with_sid.to_sql(),
            "CREATE USER [mi-app] WITH SID = 0xDBC7B9CB7727B74789540269AE3DC553, TYPE = E, DEFAULT_SCHEMA = [dbo]"
        );
        assert_eq!(with_sid.target(), Target::Database("app".into()));

        let by_name = Command::CreateExternalUser {
            database: "app".into(),
            name: "someone@example.com".into(),
            sid: None,
            default_schema: "dbo".into(),
        };
        assert_eq!(
            by_name.to_sql(),
            "CREATE USER [someone@example.com] FROM EXTERNAL PROVIDER WITH DEFAULT_SCHEMA = [dbo]"
        );
    }

    #[test]
    fn test_role_sql() {
        let db = RoleScope::Database("app".into());
        assert_eq!(
            Command::CreateRole {
                scope: db.clone(),
                name: "readers".into(),
                owner: Some("dbo".into())
            }
            .to_sql(),
            "CREATE ROLE [readers] AUTHORIZATION [dbo]"
        );
        assert_eq!(
            Command::AddRoleMember {
                scope: RoleScope::Server,
                role: "ops".into(),
                member: "app".into()
            }
            .to_sql(),
            "ALTER SERVER ROLE [ops] ADD MEMBER [app]"
        );
        assert_eq!(
            Command::AlterRoleOwner {
                scope: db.clone(),
                name: "readers".into(),
                owner: "app".into()
            }
            .to_sql(),
            "ALTER AUTHORIZATION ON ROLE::[readers] TO [app]"
        );
        assert_eq!(
            Command::DropRole {
                scope: db,
                name: "readers".into()
            }
            .to_sql(),
            "DROP ROLE IF EXISTS [readers]"
        );
        assert_eq!(
            Command::DropRole {
                scope: RoleScope::Server,
                name: "ops".into()
            }
            .to_sql(),
            "DROP SERVER ROLE [ops]"
        );
    }

    #[test]
    fn test_grant_and_revoke_sql() {
        let select = Permission::parse("select").unwrap();
        assert_eq!(
            Command::Grant {
                scope: schema_scope(),
                permission: select.clone(),
                principal: "app".into(),
                with_grant_option: true,
            }
            .to_sql(),
            "GRANT SELECT ON SCHEMA::[sales] TO [app] WITH GRANT OPTION"
        );
        assert_eq!(
            Command::Revoke {
                scope: schema_scope(),
                permission: select.clone(),
                principal: "app".into(),
                cascade: true,
            }
            .to_sql(),
            "REVOKE SELECT ON SCHEMA::[sales] FROM [app] CASCADE"
        );
        assert_eq!(
            Command::Grant {
                scope: ScopeLocator::Server,
                permission: Permission::parse("VIEW SERVER STATE").unwrap(),
                principal: "app".into(),
                with_grant_option: false,
            }
            .to_sql(),
            "GRANT VIEW SERVER STATE TO [app]"
        );
    }

    #[test]
    fn test_database_drop_sequence_sql() {
        assert_eq!(
            Command::SetSingleUser {
                database: "app".into()
            }
            .to_sql(),
            "ALTER DATABASE [app] SET SINGLE_USER WITH ROLLBACK IMMEDIATE"
        );
        assert_eq!(
            Command::DropDatabase { name: "app".into() }.to_sql(),
            "DROP DATABASE IF EXISTS [app]"
        );
    }
}
