use anyhow::{Context, Result, anyhow, bail};
use declarative::Resource;
use mssqlkit::entity::{
    DatabasePermissionSpec, DatabaseRoleMemberSpec, DatabaseRoleSpec, DatabaseSpec,
    ExternalUserSpec, LoginSpec, SchemaPermissionSpec, SchemaSpec, ServerPermissionSpec,
    ServerRoleMemberSpec, ServerRoleSpec, ServicePrincipalSpec, SqlUserSpec,
};
use mssqlkit::{Authentication, ConnectionSettings, DEFAULT_PORT, Entity, EntityKind, EntitySpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "aclsync.toml";

// ============================================================================
// Manifest
// ============================================================================

/// Declared access control, one table per entity kind keyed by label
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseSpec>,
    #[serde(default)]
    pub logins: BTreeMap<String, LoginSpec>,
    #[serde(default)]
    pub server_roles: BTreeMap<String, ServerRoleSpec>,
    #[serde(default)]
    pub server_role_members: BTreeMap<String, ServerRoleMemberSpec>,
    #[serde(default)]
    pub server_permissions: BTreeMap<String, ServerPermissionSpec>,
    #[serde(default)]
    pub database_roles: BTreeMap<String, DatabaseRoleSpec>,
    #[serde(default)]
    pub users: BTreeMap<String, SqlUserSpec>,
    #[serde(default)]
    pub external_users: BTreeMap<String, ExternalUserSpec>,
    #[serde(default)]
    pub service_principals: BTreeMap<String, ServicePrincipalSpec>,
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaSpec>,
    #[serde(default)]
    pub database_role_members: BTreeMap<String, DatabaseRoleMemberSpec>,
    #[serde(default)]
    pub database_permissions: BTreeMap<String, DatabasePermissionSpec>,
    #[serde(default)]
    pub schema_permissions: BTreeMap<String, SchemaPermissionSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub sql_auth: Option<SqlAuth>,
    pub azure_auth: Option<AzureAuth>,
    #[serde(default)]
    pub trust_server_certificate: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlAuth {
    pub username: Option<String>,
    /// May reference environment variables, e.g. `${APP_DB_PASSWORD}`
    pub password: Option<String>,
}

/// Directory authentication through the transport's default credential chain
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureAuth {}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Connection settings, falling back to `MSSQL_*` environment variables
    pub fn settings(&self) -> Result<ConnectionSettings> {
        self.connection.settings_with(|name| std::env::var(name).ok())
    }

    /// Every declared entity, validated, in apply order
    pub fn entities(&self) -> Result<Vec<Entity>> {
        self.entities_with(|name| std::env::var(name).ok())
    }

    pub fn entities_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<Vec<Entity>> {
        let mut entities = Vec::new();
        for kind in EntityKind::ALL {
            match kind {
                EntityKind::Database => {
                    labelled(&mut entities, &self.databases, EntitySpec::Database);
                }
                EntityKind::SqlLogin => {
                    for (label, spec) in &self.logins {
                        let mut spec = spec.clone();
                        spec.password = expand(&spec.password, &lookup)
                            .with_context(|| format!("password of {kind}.{label}"))?;
                        entities.push(Entity::new(label, EntitySpec::SqlLogin(spec)));
                    }
                }
                EntityKind::ServerRole => {
                    labelled(&mut entities, &self.server_roles, EntitySpec::ServerRole);
                }
                EntityKind::ServerRoleMember => labelled(
                    &mut entities,
                    &self.server_role_members,
                    EntitySpec::ServerRoleMember,
                ),
                EntityKind::ServerPermission => labelled(
                    &mut entities,
                    &self.server_permissions,
                    EntitySpec::ServerPermission,
                ),
                EntityKind::DatabaseRole => {
                    labelled(&mut entities, &self.database_roles, EntitySpec::DatabaseRole);
                }
                EntityKind::SqlUser => labelled(&mut entities, &self.users, EntitySpec::SqlUser),
                EntityKind::ExternalUser => {
                    labelled(&mut entities, &self.external_users, EntitySpec::ExternalUser);
                }
                EntityKind::ServicePrincipal => labelled(
                    &mut entities,
                    &self.service_principals,
                    EntitySpec::ServicePrincipal,
                ),
                EntityKind::Schema => labelled(&mut entities, &self.schemas, EntitySpec::Schema),
                EntityKind::DatabaseRoleMember => labelled(
                    &mut entities,
                    &self.database_role_members,
                    EntitySpec::DatabaseRoleMember,
                ),
                EntityKind::DatabasePermission => labelled(
                    &mut entities,
                    &self.database_permissions,
                    EntitySpec::DatabasePermission,
                ),
                EntityKind::SchemaPermission => labelled(
                    &mut entities,
                    &self.schema_permissions,
                    EntitySpec::SchemaPermission,
                ),
            }
        }

        for entity in &entities {
            if entity.label.trim().is_empty() {
                bail!("{} has an empty label", entity.kind());
            }
            entity
                .spec
                .validate()
                .with_context(|| format!("Invalid declaration {}", entity.address()))?;
        }
        Ok(entities)
    }
}

fn labelled<S: Clone>(
    entities: &mut Vec<Entity>,
    specs: &BTreeMap<String, S>,
    wrap: fn(S) -> EntitySpec,
) {
    entities.extend(
        specs
            .iter()
            .map(|(label, spec)| Entity::new(label, wrap(spec.clone()))),
    );
}

/// Substitute `$VAR` and `${VAR}` references; unset variables are an error
fn expand(value: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String> {
    shellexpand::env_with_context(value, |name: &str| {
        lookup(name)
            .map(Some)
            .ok_or_else(|| format!("{name} is not set"))
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| anyhow!("{e}"))
}

impl ConnectionConfig {
    pub fn settings_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ConnectionSettings> {
        let hostname = self
            .hostname
            .clone()
            .or_else(|| lookup("MSSQL_HOSTNAME"))
            .context("No hostname: set connection.hostname or MSSQL_HOSTNAME")?;

        let port = match (self.port, lookup("MSSQL_PORT")) {
            (Some(port), _) => port,
            (None, Some(value)) => value
                .parse()
                .with_context(|| format!("MSSQL_PORT is not a port number: {value}"))?,
            (None, None) => DEFAULT_PORT,
        };

        let authentication = match (&self.sql_auth, &self.azure_auth) {
            (Some(_), Some(_)) => bail!("connection sets both sql_auth and azure_auth"),
            (None, Some(_)) => Authentication::AzureDefault,
            (sql, None) => {
                let sql = sql.as_ref();
                let username = sql
                    .and_then(|s| s.username.clone())
                    .or_else(|| lookup("MSSQL_USERNAME"));
                let password = sql
                    .and_then(|s| s.password.clone())
                    .or_else(|| lookup("MSSQL_PASSWORD"));
                match (username, password) {
                    (Some(username), Some(password)) => Authentication::Sql {
                        username,
                        password: expand(&password, &lookup)
                            .context("connection.sql_auth.password")?,
                    },
                    _ if sql.is_some() => bail!(
                        "sql_auth needs a username and password (or MSSQL_USERNAME and MSSQL_PASSWORD)"
                    ),
                    _ => Authentication::AzureDefault,
                }
            }
        };

        Ok(ConnectionSettings {
            hostname,
            port,
            authentication,
            trust_server_certificate: self.trust_server_certificate,
        })
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Manifest location: explicit path, `./aclsync.toml`, then the user config dir
pub fn manifest_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    }
    let local = PathBuf::from(MANIFEST_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("aclsync").join(MANIFEST_FILE))
        .filter(|path| path.exists())
        .unwrap_or(local)
}
