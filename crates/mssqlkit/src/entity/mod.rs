//! Declared entities and their tracked state
//!
//! Every manageable object is one variant of [`EntitySpec`] (what the
//! caller declares) paired with one variant of [`EntityState`] (what was
//! read back from the engine). [`Entity`] ties a declaration to a stable label and
//! implements the lifecycle traits from the `declarative` crate:
//! - materialize: create, apply initial grants and memberships, re-read
//! - refresh: resolve by id then name, `Absent` when gone
//! - converge: mutable attributes, memberships and grant options in place
//! - dematerialize: drop
//!
//! Nothing is cached between calls; the catalog handle is passed in every
//! time.

mod database;
mod grant;
mod login;
mod member;
mod role;
mod schema;
mod user;

pub use database::{DatabaseSpec, DatabaseState};
pub use grant::{
    DatabasePermissionSpec, DatabasePermissionState, SchemaPermissionSpec, SchemaPermissionState,
    ServerPermissionSpec, ServerPermissionState,
};
pub use login::{LoginSpec, LoginState, password_digest};
pub use member::{
    DatabaseRoleMemberSpec, DatabaseRoleMemberState, ServerRoleMemberSpec, ServerRoleMemberState,
};
pub use role::{DatabaseRoleSpec, DatabaseRoleState, ServerRoleSpec, ServerRoleState};
pub use schema::{SchemaSpec, SchemaState};
pub use user::{
    ExternalUserSpec, ExternalUserState, ServicePrincipalSpec, ServicePrincipalState,
    SqlUserSpec, SqlUserState,
};

use crate::catalog::{Catalog, Lookup};
use crate::error::{Error, Result};
use declarative::{Diff, Observed, Refresh, Resource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every kind of entity, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Database,
    SqlLogin,
    ServerRole,
    ServerRoleMember,
    ServerPermission,
    DatabaseRole,
    SqlUser,
    ExternalUser,
    ServicePrincipal,
    Schema,
    DatabaseRoleMember,
    DatabasePermission,
    SchemaPermission,
}

impl EntityKind {
    pub const ALL: [EntityKind; 13] = [
        Self::Database,
        Self::SqlLogin,
        Self::ServerRole,
        Self::ServerRoleMember,
        Self::ServerPermission,
        Self::DatabaseRole,
        Self::SqlUser,
        Self::ExternalUser,
        Self::ServicePrincipal,
        Self::Schema,
        Self::DatabaseRoleMember,
        Self::DatabasePermission,
        Self::SchemaPermission,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::SqlLogin => "sql_login",
            Self::ServerRole => "server_role",
            Self::ServerRoleMember => "server_role_member",
            Self::ServerPermission => "server_permission",
            Self::DatabaseRole => "database_role",
            Self::SqlUser => "sql_user",
            Self::ExternalUser => "external_user",
            Self::ServicePrincipal => "service_principal",
            Self::Schema => "schema",
            Self::DatabaseRoleMember => "database_role_member",
            Self::DatabasePermission => "database_permission",
            Self::SchemaPermission => "schema_permission",
        }
    }

    /// Whether a target filter such as `users` or `sql_login` selects `resource_type`.
    pub fn matches_filter(filter: &str, resource_type: &str) -> bool {
        match filter {
            "logins" => resource_type == "sql_login",
            "users" => matches!(
                resource_type,
                "sql_user" | "external_user" | "service_principal"
            ),
            "roles" => resource_type.ends_with("_role"),
            "members" => resource_type.ends_with("_role_member"),
            "permissions" => resource_type.ends_with("_permission"),
            _ => resource_type == filter,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown entity kind '{s}'")))
    }
}

/// Attribute-level comparison of a declaration against tracked state.
#[derive(Debug, Default)]
pub(crate) struct Changes {
    identity: Vec<&'static str>,
    mutable: Vec<&'static str>,
}

impl Changes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// An attribute that can only change by destroy-and-recreate.
    pub(crate) fn identity(mut self, attribute: &'static str, changed: bool) -> Self {
        if changed {
            self.identity.push(attribute);
        }
        self
    }

    /// An attribute converged in place.
    pub(crate) fn mutable(mut self, attribute: &'static str, changed: bool) -> Self {
        if changed {
            self.mutable.push(attribute);
        }
        self
    }

    pub(crate) fn has(&self, attribute: &str) -> bool {
        self.identity
            .iter()
            .chain(&self.mutable)
            .any(|a| *a == attribute)
    }

    pub(crate) fn into_diff(self) -> Diff {
        let owned = |attrs: Vec<&str>| attrs.into_iter().map(String::from).collect();
        if !self.identity.is_empty() {
            Diff::Replace {
                attributes: owned(self.identity),
            }
        } else if !self.mutable.is_empty() {
            Diff::Update {
                attributes: owned(self.mutable),
            }
        } else {
            Diff::NoChange
        }
    }
}

/// Lifecycle of one declared kind.
pub(crate) trait Declared {
    type State;

    /// Reject empty names and malformed identifiers before any I/O.
    fn validate(&self) -> Result<()>;

    fn describe(&self) -> String;

    fn create(&self, catalog: &dyn Catalog) -> Result<Self::State>;

    fn import(&self, catalog: &dyn Catalog) -> Result<Option<Self::State>>;

    fn changes(&self, state: &Self::State) -> Changes;

    /// Converge mutable attributes. Identity changes never reach here.
    fn converge(&self, state: &Self::State, catalog: &dyn Catalog) -> Result<Self::State>;
}

/// Lifecycle of one tracked kind.
pub(crate) trait Tracked: Sized {
    fn summary(&self) -> String;

    /// `None` when the entity is gone.
    fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<Self>>;

    fn destroy(&self, catalog: &dyn Catalog) -> Result<()>;
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) fn database_exists(catalog: &dyn Catalog, name: &str) -> Result<bool> {
    Ok(catalog.database(Lookup::Name(name))?.is_some())
}

pub(crate) fn missing(kind: &'static str, name: impl Into<String>) -> Error {
    Error::NotFound {
        kind,
        name: name.into(),
    }
}

/// What the caller declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySpec {
    Database(DatabaseSpec),
    SqlLogin(LoginSpec),
    ServerRole(ServerRoleSpec),
    ServerRoleMember(ServerRoleMemberSpec),
    ServerPermission(ServerPermissionSpec),
    DatabaseRole(DatabaseRoleSpec),
    SqlUser(SqlUserSpec),
    ExternalUser(ExternalUserSpec),
    ServicePrincipal(ServicePrincipalSpec),
    Schema(SchemaSpec),
    DatabaseRoleMember(DatabaseRoleMemberSpec),
    DatabasePermission(DatabasePermissionSpec),
    SchemaPermission(SchemaPermissionSpec),
}

/// What was read back from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityState {
    Database(DatabaseState),
    SqlLogin(LoginState),
    ServerRole(ServerRoleState),
    ServerRoleMember(ServerRoleMemberState),
    ServerPermission(ServerPermissionState),
    DatabaseRole(DatabaseRoleState),
    SqlUser(SqlUserState),
    ExternalUser(ExternalUserState),
    ServicePrincipal(ServicePrincipalState),
    Schema(SchemaState),
    DatabaseRoleMember(DatabaseRoleMemberState),
    DatabasePermission(DatabasePermissionState),
    SchemaPermission(SchemaPermissionState),
}

/// Run `$body` against the inner value of any variant of `$enum`.
macro_rules! each_variant {
    ($enum:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            $enum::Database($inner) => $body,
            $enum::SqlLogin($inner) => $body,
            $enum::ServerRole($inner) => $body,
            $enum::ServerRoleMember($inner) => $body,
            $enum::ServerPermission($inner) => $body,
            $enum::DatabaseRole($inner) => $body,
            $enum::SqlUser($inner) => $body,
            $enum::ExternalUser($inner) => $body,
            $enum::ServicePrincipal($inner) => $body,
            $enum::Schema($inner) => $body,
            $enum::DatabaseRoleMember($inner) => $body,
            $enum::DatabasePermission($inner) => $body,
            $enum::SchemaPermission($inner) => $body,
        }
    };
}

/// Run `$body` when declaration and state are the same kind, `$otherwise` when not.
macro_rules! each_pair {
    ($spec:expr, $state:expr, ($s:ident, $t:ident) => $body:expr, _ => $otherwise:expr) => {
        match ($spec, $state) {
            (EntitySpec::Database($s), EntityState::Database($t)) => $body,
            (EntitySpec::SqlLogin($s), EntityState::SqlLogin($t)) => $body,
            (EntitySpec::ServerRole($s), EntityState::ServerRole($t)) => $body,
            (EntitySpec::ServerRoleMember($s), EntityState::ServerRoleMember($t)) => $body,
            (EntitySpec::ServerPermission($s), EntityState::ServerPermission($t)) => $body,
            (EntitySpec::DatabaseRole($s), EntityState::DatabaseRole($t)) => $body,
            (EntitySpec::SqlUser($s), EntityState::SqlUser($t)) => $body,
            (EntitySpec::ExternalUser($s), EntityState::ExternalUser($t)) => $body,
            (EntitySpec::ServicePrincipal($s), EntityState::ServicePrincipal($t)) => $body,
            (EntitySpec::Schema($s), EntityState::Schema($t)) => $body,
            (EntitySpec::DatabaseRoleMember($s), EntityState::DatabaseRoleMember($t)) => $body,
            (EntitySpec::DatabasePermission($s), EntityState::DatabasePermission($t)) => $body,
            (EntitySpec::SchemaPermission($s), EntityState::SchemaPermission($t)) => $body,
            _ => $otherwise,
        }
    };
}

macro_rules! state_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for EntityState {
            fn from(state: $ty) -> Self {
                Self::$variant(state)
            }
        })*
    };
}

state_from!(
    Database(DatabaseState),
    SqlLogin(LoginState),
    ServerRole(ServerRoleState),
    ServerRoleMember(ServerRoleMemberState),
    ServerPermission(ServerPermissionState),
    DatabaseRole(DatabaseRoleState),
    SqlUser(SqlUserState),
    ExternalUser(ExternalUserState),
    ServicePrincipal(ServicePrincipalState),
    Schema(SchemaState),
    DatabaseRoleMember(DatabaseRoleMemberState),
    DatabasePermission(DatabasePermissionState),
    SchemaPermission(SchemaPermissionState),
);

impl EntitySpec {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Database(_) => EntityKind::Database,
            Self::SqlLogin(_) => EntityKind::SqlLogin,
            Self::ServerRole(_) => EntityKind::ServerRole,
            Self::ServerRoleMember(_) => EntityKind::ServerRoleMember,
            Self::ServerPermission(_) => EntityKind::ServerPermission,
            Self::DatabaseRole(_) => EntityKind::DatabaseRole,
            Self::SqlUser(_) => EntityKind::SqlUser,
            Self::ExternalUser(_) => EntityKind::ExternalUser,
            Self::ServicePrincipal(_) => EntityKind::ServicePrincipal,
            Self::Schema(_) => EntityKind::Schema,
            Self::DatabaseRoleMember(_) => EntityKind::DatabaseRoleMember,
            Self::DatabasePermission(_) => EntityKind::DatabasePermission,
            Self::SchemaPermission(_) => EntityKind::SchemaPermission,
        }
    }

    pub fn validate(&self) -> Result<()> {
        each_variant!(EntitySpec, self, spec => spec.validate())
    }

    pub fn describe(&self) -> String {
        each_variant!(EntitySpec, self, spec => spec.describe())
    }

    /// Create the entity, apply initial grants and memberships, and re-read it.
    pub fn materialize(&self, catalog: &dyn Catalog) -> Result<EntityState> {
        each_variant!(EntitySpec, self, spec => spec.create(catalog).map(EntityState::from))
    }

    /// Read an existing entity matching this declaration without changing it.
    pub fn import(&self, catalog: &dyn Catalog) -> Result<Option<EntityState>> {
        each_variant!(EntitySpec, self, spec => Ok(spec.import(catalog)?.map(EntityState::from)))
    }

    /// Compare against tracked state. A kind mismatch means replacement.
    pub fn diff(&self, state: &EntityState) -> Diff {
        each_pair!(self, state, (spec, tracked) => spec.changes(tracked).into_diff(), _ => {
            Diff::Replace {
                attributes: vec!["kind".to_string()],
            }
        })
    }

    /// Converge in place; identity changes are refused.
    pub fn converge(
        &self,
        address: &str,
        state: &EntityState,
        catalog: &dyn Catalog,
    ) -> Result<EntityState> {
        let conflict = |attributes| Error::ConflictingAttributeChange {
            address: address.to_string(),
            attributes,
        };
        if let Diff::Replace { attributes } = self.diff(state) {
            return Err(conflict(attributes));
        }
        each_pair!(self, state, (spec, tracked) => {
            spec.converge(tracked, catalog).map(EntityState::from)
        }, _ => Err(conflict(vec!["kind".to_string()])))
    }
}

impl EntityState {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Database(_) => EntityKind::Database,
            Self::SqlLogin(_) => EntityKind::SqlLogin,
            Self::ServerRole(_) => EntityKind::ServerRole,
            Self::ServerRoleMember(_) => EntityKind::ServerRoleMember,
            Self::ServerPermission(_) => EntityKind::ServerPermission,
            Self::DatabaseRole(_) => EntityKind::DatabaseRole,
            Self::SqlUser(_) => EntityKind::SqlUser,
            Self::ExternalUser(_) => EntityKind::ExternalUser,
            Self::ServicePrincipal(_) => EntityKind::ServicePrincipal,
            Self::Schema(_) => EntityKind::Schema,
            Self::DatabaseRoleMember(_) => EntityKind::DatabaseRoleMember,
            Self::DatabasePermission(_) => EntityKind::DatabasePermission,
            Self::SchemaPermission(_) => EntityKind::SchemaPermission,
        }
    }

    pub fn summary(&self) -> String {
        each_variant!(EntityState, self, state => state.summary())
    }

    /// Re-read the entity. `None` is the normal signal that it is gone.
    pub fn refresh(&self, catalog: &dyn Catalog) -> Result<Option<EntityState>> {
        each_variant!(EntityState, self, state => Ok(state.refresh(catalog)?.map(EntityState::from)))
    }

    pub fn dematerialize(&self, catalog: &dyn Catalog) -> Result<()> {
        each_variant!(EntityState, self, state => state.destroy(catalog))
    }
}

/// A labelled declaration, addressed as `kind.label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub label: String,
    pub spec: EntitySpec,
}

impl Entity {
    pub fn new(label: impl Into<String>, spec: EntitySpec) -> Self {
        Self {
            label: label.into(),
            spec,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.spec.kind()
    }
}

impl Resource for Entity {
    type State = EntityState;
    type Conn = dyn Catalog;

    fn address(&self) -> String {
        format!("{}.{}", self.kind(), self.label)
    }

    fn resource_type(&self) -> &'static str {
        self.kind().as_str()
    }

    fn description(&self) -> String {
        self.spec.describe()
    }

    fn materialize(&self, catalog: &Self::Conn) -> anyhow::Result<EntityState> {
        Ok(self.spec.materialize(catalog)?)
    }

    fn import(&self, catalog: &Self::Conn) -> anyhow::Result<Option<EntityState>> {
        Ok(self.spec.import(catalog)?)
    }

    fn diff(&self, state: &EntityState) -> Diff {
        self.spec.diff(state)
    }

    fn converge(&self, state: &EntityState, catalog: &Self::Conn) -> anyhow::Result<EntityState> {
        Ok(self.spec.converge(&self.address(), state, catalog)?)
    }
}

impl Observed for EntityState {
    type Conn = dyn Catalog;

    fn resource_type(&self) -> &'static str {
        self.kind().as_str()
    }

    fn summary(&self) -> String {
        EntityState::summary(self)
    }

    fn refresh(&self, catalog: &Self::Conn) -> anyhow::Result<Refresh<Self>> {
        Ok(match EntityState::refresh(self, catalog)? {
            Some(state) => Refresh::Present(state),
            None => Refresh::Absent,
        })
    }

    fn dematerialize(&self, catalog: &Self::Conn) -> anyhow::Result<()> {
        Ok(EntityState::dematerialize(self, catalog)?)
    }
}
