//! In-memory engine implementing [`Catalog`].
//!
//! Models the parts of the engine the reconciler depends on: principals
//! with volatile ids that change on drop-and-recreate, schema and role
//! ownership, role memberships, and GRANT rows with the grant option.
//! Every statement is recorded so callers can assert on what was sent.

use crate::catalog::{
    Catalog, DatabaseRow, GrantRow, Lookup, LoginRow, RoleRow, SchemaRow, UserRow, UserType,
};
use crate::command::{Command, LoginOption};
use crate::error::{Error, Result};
use crate::types::{RoleScope, ScopeLocator};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

/// Login the engine treats as the connecting principal.
pub const CONNECTING_LOGIN: &str = "sa";

const DEFAULT_LANGUAGE: &str = "us_english";
const FIXED_DATABASE_ROLES: [&str; 4] =
    ["db_owner", "db_datareader", "db_datawriter", "db_ddladmin"];
const FIXED_SERVER_ROLES: [&str; 3] = ["sysadmin", "securityadmin", "dbcreator"];

#[derive(Debug, Clone)]
struct MemLogin {
    row: LoginRow,
    password: String,
}

/// (schema, principal, permission); schema is `None` for database scope.
type GrantKey = (Option<String>, String, String);

#[derive(Debug, Clone, Default)]
struct MemDatabase {
    id: i32,
    users: BTreeMap<String, UserRow>,
    roles: BTreeMap<String, RoleRow>,
    schemas: BTreeMap<String, SchemaRow>,
    /// (role, member)
    members: BTreeSet<(String, String)>,
    grants: BTreeMap<GrantKey, bool>,
}

impl MemDatabase {
    fn has_principal(&self, name: &str) -> bool {
        self.users.contains_key(name) || self.roles.contains_key(name)
    }
}

#[derive(Debug, Default)]
struct Store {
    next_id: i32,
    databases: BTreeMap<String, MemDatabase>,
    logins: BTreeMap<String, MemLogin>,
    server_roles: BTreeMap<String, RoleRow>,
    server_members: BTreeSet<(String, String)>,
    /// (principal, permission) -> grant option
    server_grants: BTreeMap<(String, String), bool>,
}

impl Store {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_database(&mut self, name: &str) {
        let id = self.allocate_id();
        let mut db = MemDatabase {
            id,
            ..MemDatabase::default()
        };
        let dbo_id = self.allocate_id();
        db.users.insert(
            "dbo".into(),
            UserRow {
                id: dbo_id,
                name: "dbo".into(),
                default_schema: "dbo".into(),
                user_type: UserType::Sql,
                login_name: Some(CONNECTING_LOGIN.into()),
                sid: None,
            },
        );
        let schema_id = self.allocate_id();
        db.schemas.insert(
            "dbo".into(),
            SchemaRow {
                id: schema_id,
                name: "dbo".into(),
                owner: "dbo".into(),
            },
        );
        for role in FIXED_DATABASE_ROLES {
            let role_id = self.allocate_id();
            db.roles.insert(
                role.into(),
                RoleRow {
                    id: role_id,
                    name: role.into(),
                    owner: Some("dbo".into()),
                    is_fixed: true,
                },
            );
        }
        self.databases.insert(name.to_string(), db);
    }

    fn server_principal_exists(&self, name: &str) -> bool {
        self.logins.contains_key(name) || self.server_roles.contains_key(name)
    }

    fn database(&self, name: &str) -> std::result::Result<&MemDatabase, String> {
        self.databases
            .get(name)
            .ok_or_else(|| format!("Database '{name}' does not exist. Make sure that the name is entered correctly."))
    }

    fn database_mut(&mut self, name: &str) -> std::result::Result<&mut MemDatabase, String> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| format!("Database '{name}' does not exist. Make sure that the name is entered correctly."))
    }
}

/// In-memory stand-in for the engine.
pub struct MemoryEngine {
    store: RefCell<Store>,
    log: RefCell<Vec<Command>>,
    failures: RefCell<Vec<(String, String)>>,
    unreachable: Cell<bool>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Engine with `master`, the connecting login and the fixed server roles.
    pub fn new() -> Self {
        let mut store = Store {
            next_id: 100,
            ..Store::default()
        };
        store.create_database("master");
        let sa_id = store.allocate_id();
        store.logins.insert(
            CONNECTING_LOGIN.into(),
            MemLogin {
                row: LoginRow {
                    id: sa_id,
                    name: CONNECTING_LOGIN.into(),
                    default_database: "master".into(),
                    default_language: DEFAULT_LANGUAGE.into(),
                    check_expiration: false,
                    check_policy: true,
                    is_disabled: false,
                },
                password: String::new(),
            },
        );
        for role in FIXED_SERVER_ROLES {
            let id = store.allocate_id();
            store.server_roles.insert(
                role.into(),
                RoleRow {
                    id,
                    name: role.into(),
                    owner: Some(CONNECTING_LOGIN.into()),
                    is_fixed: true,
                },
            );
        }
        store
            .server_members
            .insert(("sysadmin".into(), CONNECTING_LOGIN.into()));

        Self {
            store: RefCell::new(store),
            log: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
            unreachable: Cell::new(false),
        }
    }

    /// Add a database without recording a statement.
    pub fn with_database(self, name: &str) -> Self {
        self.store.borrow_mut().create_database(name);
        self
    }

    /// Reject any statement whose SQL contains `fragment` with `message`.
    pub fn fail_when(&self, fragment: &str, message: &str) {
        self.failures
            .borrow_mut()
            .push((fragment.to_string(), message.to_string()));
    }

    /// Drop all injected failures.
    pub fn clear_failures(&self) {
        self.failures.borrow_mut().clear();
    }

    /// Make every call fail as if the engine were unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.set(unreachable);
    }

    /// Statements sent so far, including rejected ones.
    pub fn commands(&self) -> Vec<Command> {
        self.log.borrow().clone()
    }

    /// SQL text of statements sent so far.
    pub fn statements(&self) -> Vec<String> {
        self.log.borrow().iter().map(Command::to_sql).collect()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    /// Current password of a login, for asserting password changes.
    pub fn login_password(&self, name: &str) -> Option<String> {
        self.store
            .borrow()
            .logins
            .get(name)
            .map(|l| l.password.clone())
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.get() {
            return Err(Error::ConnectionUnavailable {
                message: "TCP Provider: No connection could be made".into(),
            });
        }
        Ok(())
    }

    fn apply(&self, command: &Command) -> std::result::Result<(), String> {
        let mut store = self.store.borrow_mut();
        let store = &mut *store;

        match command {
            Command::CreateDatabase { name } => {
                if store.databases.contains_key(name) {
                    return Err(format!(
                        "Database '{name}' already exists. Choose a different database name."
                    ));
                }
                store.create_database(name);
            }
            Command::SetSingleUser { database } => {
                store.database(database)?;
            }
            Command::DropDatabase { name } => {
                store.databases.remove(name);
            }
            Command::CreateLogin {
                name,
                password,
                default_database,
                default_language,
                check_expiration,
                check_policy,
            } => {
                if store.server_principal_exists(name) {
                    return Err(format!("The server principal '{name}' already exists."));
                }
                let id = store.allocate_id();
                store.logins.insert(
                    name.clone(),
                    MemLogin {
                        row: LoginRow {
                            id,
                            name: name.clone(),
                            default_database: default_database.clone(),
                            default_language: default_language
                                .clone()
                                .unwrap_or_else(|| DEFAULT_LANGUAGE.into()),
                            check_expiration: *check_expiration,
                            check_policy: *check_policy,
                            is_disabled: false,
                        },
                        password: password.clone(),
                    },
                );
            }
            Command::AlterLoginPassword { name, password } => {
                login_mut(store, name)?.password = password.clone();
            }
            Command::AlterLoginOptions { name, options } => {
                let login = login_mut(store, name)?;
                for option in options {
                    match option {
                        LoginOption::DefaultDatabase(db) => {
                            login.row.default_database = db.clone();
                        }
                        LoginOption::DefaultLanguage(lang) => {
                            login.row.default_language = lang.clone();
                        }
                        LoginOption::CheckExpiration(on) => login.row.check_expiration = *on,
                        LoginOption::CheckPolicy(on) => login.row.check_policy = *on,
                    }
                }
            }
            Command::SetLoginEnabled { name, enabled } => {
                login_mut(store, name)?.row.is_disabled = !enabled;
            }
            Command::DropLogin { name } => {
                if store.logins.remove(name).is_none() {
                    return Err(format!(
                        "Cannot drop the login '{name}', because it does not exist or you do not have permission."
                    ));
                }
                store.server_members.retain(|(_, m)| m != name);
                store.server_grants.retain(|(p, _), _| p != name);
            }
            Command::CreateUserForLogin {
                database,
                name,
                login,
                default_schema,
            } => {
                if !store.logins.contains_key(login) {
                    return Err(format!(
                        "'{login}' is not a valid login or you do not have permission."
                    ));
                }
                let id = store.allocate_id();
                let db = store.database_mut(database)?;
                if db.has_principal(name) {
                    return Err(already_exists_in_db(name));
                }
                if db
                    .users
                    .values()
                    .any(|u| u.login_name.as_deref() == Some(login.as_str()))
                {
                    return Err(
                        "The login already has an account under a different user name.".into(),
                    );
                }
                db.users.insert(
                    name.clone(),
                    UserRow {
                        id,
                        name: name.clone(),
                        default_schema: default_schema.clone(),
                        user_type: UserType::Sql,
                        login_name: Some(login.clone()),
                        sid: None,
                    },
                );
            }
            Command::CreateExternalUser {
                database,
                name,
                sid,
                default_schema,
            } => {
                let id = store.allocate_id();
                let db = store.database_mut(database)?;
                if db.has_principal(name) {
                    return Err(already_exists_in_db(name));
                }
                db.users.insert(
                    name.clone(),
                    UserRow {
                        id,
                        name: name.clone(),
                        default_schema: default_schema.clone(),
                        user_type: UserType::External,
                        login_name: None,
                        sid: sid.as_ref().map(ToString::to_string),
                    },
                );
            }
            Command::AlterUserDefaultSchema {
                database,
                name,
                default_schema,
            } => {
                let db = store.database_mut(database)?;
                let user = db.users.get_mut(name).ok_or_else(|| {
                    format!(
                        "Cannot alter the user '{name}', because it does not exist or you do not have permission."
                    )
                })?;
                user.default_schema = default_schema.clone();
            }
            Command::DropUser { database, name } => {
                let db = store.database_mut(database)?;
                if db.schemas.values().any(|s| &s.owner == name) {
                    return Err(
                        "The database principal owns a schema in the database, and cannot be dropped."
                            .into(),
                    );
                }
                if db.users.remove(name).is_some() {
                    db.members.retain(|(_, m)| m != name);
                    db.grants.retain(|(_, p, _), _| p != name);
                }
            }
            Command::CreateRole { scope, name, owner } => {
                let id = store.allocate_id();
                match scope {
                    RoleScope::Server => {
                        if store.server_principal_exists(name) {
                            return Err(format!("The server principal '{name}' already exists."));
                        }
                        let owner = owner.clone().unwrap_or_else(|| CONNECTING_LOGIN.into());
                        if !store.server_principal_exists(&owner) {
                            return Err(cannot_find_principal(&owner));
                        }
                        store.server_roles.insert(
                            name.clone(),
                            RoleRow {
                                id,
                                name: name.clone(),
                                owner: Some(owner),
                                is_fixed: false,
                            },
                        );
                    }
                    RoleScope::Database(database) => {
                        let db = store.database_mut(database)?;
                        if db.has_principal(name) {
                            return Err(already_exists_in_db(name));
                        }
                        let owner = owner.clone().unwrap_or_else(|| "dbo".into());
                        if !db.has_principal(&owner) {
                            return Err(cannot_find_user(&owner));
                        }
                        db.roles.insert(
                            name.clone(),
                            RoleRow {
                                id,
                                name: name.clone(),
                                owner: Some(owner),
                                is_fixed: false,
                            },
                        );
                    }
                }
            }
            Command::AlterRoleOwner { scope, name, owner } => match scope {
                RoleScope::Server => {
                    if !store.server_principal_exists(owner) {
                        return Err(cannot_find_principal(owner));
                    }
                    let role = store
                        .server_roles
                        .get_mut(name)
                        .ok_or_else(|| cannot_alter_role(name))?;
                    role.owner = Some(owner.clone());
                }
                RoleScope::Database(database) => {
                    let db = store.database_mut(database)?;
                    if !db.has_principal(owner) {
                        return Err(cannot_find_user(owner));
                    }
                    let role = db.roles.get_mut(name).ok_or_else(|| cannot_alter_role(name))?;
                    role.owner = Some(owner.clone());
                }
            },
            Command::DropRole { scope, name } => match scope {
                RoleScope::Server => {
                    if store.server_members.iter().any(|(r, _)| r == name) {
                        return Err(role_has_members());
                    }
                    if store.server_roles.remove(name).is_none() {
                        return Err(format!(
                            "Cannot drop the server role '{name}', because it does not exist or you do not have permission."
                        ));
                    }
                    store.server_grants.retain(|(p, _), _| p != name);
                }
                RoleScope::Database(database) => {
                    let db = store.database_mut(database)?;
                    if db.members.iter().any(|(r, _)| r == name) {
                        return Err(role_has_members());
                    }
                    if db.roles.remove(name).is_some() {
                        db.members.retain(|(_, m)| m != name);
                        db.grants.retain(|(_, p, _), _| p != name);
                    }
                }
            },
            Command::AddRoleMember {
                scope,
                role,
                member,
            } => match scope {
                RoleScope::Server => {
                    if !store.server_roles.contains_key(role) {
                        return Err(cannot_alter_role(role));
                    }
                    if !store.server_principal_exists(member) {
                        return Err(cannot_add_principal(member));
                    }
                    store.server_members.insert((role.clone(), member.clone()));
                }
                RoleScope::Database(database) => {
                    let db = store.database_mut(database)?;
                    if !db.roles.contains_key(role) {
                        return Err(cannot_alter_role(role));
                    }
                    if !db.has_principal(member) {
                        return Err(cannot_add_principal(member));
                    }
                    db.members.insert((role.clone(), member.clone()));
                }
            },
            Command::DropRoleMember {
                scope,
                role,
                member,
            } => match scope {
                RoleScope::Server => {
                    if !store.server_roles.contains_key(role) {
                        return Err(cannot_alter_role(role));
                    }
                    store
                        .server_members
                        .remove(&(role.clone(), member.clone()));
                }
                RoleScope::Database(database) => {
                    let db = store.database_mut(database)?;
                    if !db.roles.contains_key(role) {
                        return Err(cannot_alter_role(role));
                    }
                    db.members.remove(&(role.clone(), member.clone()));
                }
            },
            Command::CreateSchema {
                database,
                name,
                owner,
            } => {
                let id = store.allocate_id();
                let db = store.database_mut(database)?;
                if db.schemas.contains_key(name) {
                    return Err(format!(
                        "There is already an object named '{name}' in the database."
                    ));
                }
                let owner = owner.clone().unwrap_or_else(|| "dbo".into());
                if !db.has_principal(&owner) {
                    return Err(cannot_find_user(&owner));
                }
                db.schemas.insert(
                    name.clone(),
                    SchemaRow {
                        id,
                        name: name.clone(),
                        owner,
                    },
                );
            }
            Command::AlterSchemaOwner {
                database,
                name,
                owner,
            } => {
                let db = store.database_mut(database)?;
                if !db.has_principal(owner) {
                    return Err(cannot_find_user(owner));
                }
                let schema = db.schemas.get_mut(name).ok_or_else(|| {
                    format!(
                        "Cannot find the schema '{name}', because it does not exist or you do not have permission."
                    )
                })?;
                schema.owner = owner.clone();
            }
            Command::DropSchema { database, name } => {
                let db = store.database_mut(database)?;
                if db.schemas.remove(name).is_some() {
                    db.grants
                        .retain(|(schema, _, _), _| schema.as_deref() != Some(name.as_str()));
                }
            }
            Command::Grant {
                scope,
                permission,
                principal,
                with_grant_option,
            } => {
                let key = permission.as_str().to_string();
                match scope {
                    ScopeLocator::Server => {
                        if !store.server_principal_exists(principal) {
                            return Err(cannot_find_principal(principal));
                        }
                        let entry = store
                            .server_grants
                            .entry((principal.clone(), key))
                            .or_insert(false);
                        *entry |= *with_grant_option;
                    }
                    ScopeLocator::Database { database } => {
                        let db = store.database_mut(database)?;
                        if !db.has_principal(principal) {
                            return Err(cannot_find_user(principal));
                        }
                        if principal == "dbo" {
                            return Err(cannot_grant_to_owner());
                        }
                        let entry = db
                            .grants
                            .entry((None, principal.clone(), key))
                            .or_insert(false);
                        *entry |= *with_grant_option;
                    }
                    ScopeLocator::Schema { database, schema } => {
                        let db = store.database_mut(database)?;
                        if !db.has_principal(principal) {
                            return Err(cannot_find_user(principal));
                        }
                        let owner = db
                            .schemas
                            .get(schema)
                            .map(|s| s.owner.clone())
                            .ok_or_else(|| {
                                format!(
                                    "Cannot find the schema '{schema}', because it does not exist or you do not have permission."
                                )
                            })?;
                        if &owner == principal {
                            return Err(cannot_grant_to_owner());
                        }
                        let entry = db
                            .grants
                            .entry((Some(schema.clone()), principal.clone(), key))
                            .or_insert(false);
                        *entry |= *with_grant_option;
                    }
                }
            }
            Command::Revoke {
                scope,
                permission,
                principal,
                ..
            } => {
                let key = permission.as_str().to_string();
                match scope {
                    ScopeLocator::Server => {
                        store.server_grants.remove(&(principal.clone(), key));
                    }
                    ScopeLocator::Database { database } => {
                        let db = store.database_mut(database)?;
                        db.grants.remove(&(None, principal.clone(), key));
                    }
                    ScopeLocator::Schema { database, schema } => {
                        let db = store.database_mut(database)?;
                        db.grants
                            .remove(&(Some(schema.clone()), principal.clone(), key));
                    }
                }
            }
        }
        Ok(())
    }

    fn read_database<R>(
        &self,
        database: &str,
        read: impl FnOnce(&MemDatabase) -> R,
    ) -> Result<R> {
        self.check_reachable()?;
        let store = self.store.borrow();
        let db = store.database(database).map_err(|message| Error::EngineCommandFailure {
            statement: format!("USE [{database}]"),
            message,
        })?;
        Ok(read(db))
    }
}

fn login_mut<'a>(
    store: &'a mut Store,
    name: &str,
) -> std::result::Result<&'a mut MemLogin, String> {
    store.logins.get_mut(name).ok_or_else(|| {
        format!(
            "Cannot alter the login '{name}', because it does not exist or you do not have permission."
        )
    })
}

fn already_exists_in_db(name: &str) -> String {
    format!("User, group, or role '{name}' already exists in the current database.")
}

fn cannot_find_user(name: &str) -> String {
    format!("Cannot find the user '{name}', because it does not exist or you do not have permission.")
}

fn cannot_find_principal(name: &str) -> String {
    format!(
        "Cannot find the principal '{name}', because it does not exist or you do not have permission."
    )
}

fn cannot_alter_role(name: &str) -> String {
    format!("Cannot alter the role '{name}', because it does not exist or you do not have permission.")
}

fn cannot_add_principal(name: &str) -> String {
    format!("Cannot add the principal '{name}', because it does not exist or you do not have permission.")
}

fn role_has_members() -> String {
    "The role has members. It must be empty before it can be dropped.".into()
}

fn cannot_grant_to_owner() -> String {
    "Cannot grant, deny, or revoke permissions to sa, dbo, entity owner, information_schema, sys, or yourself.".into()
}

fn find<'a, T>(
    map: &'a BTreeMap<String, T>,
    lookup: Lookup<'_>,
    id_of: impl Fn(&T) -> i32,
) -> Option<&'a T> {
    match lookup {
        Lookup::Name(name) => map.get(name),
        Lookup::Id(id) => map.values().find(|v| id_of(v) == id),
    }
}

impl Catalog for MemoryEngine {
    fn database(&self, lookup: Lookup<'_>) -> Result<Option<DatabaseRow>> {
        self.check_reachable()?;
        let store = self.store.borrow();
        let found = match lookup {
            Lookup::Name(name) => store.databases.get_key_value(name),
            Lookup::Id(id) => store.databases.iter().find(|(_, db)| db.id == id),
        };
        Ok(found.map(|(name, db)| DatabaseRow {
            id: db.id,
            name: name.clone(),
        }))
    }

    fn login(&self, lookup: Lookup<'_>) -> Result<Option<LoginRow>> {
        self.check_reachable()?;
        let store = self.store.borrow();
        Ok(find(&store.logins, lookup, |l| l.row.id).map(|l| l.row.clone()))
    }

    fn server_role(&self, lookup: Lookup<'_>) -> Result<Option<RoleRow>> {
        self.check_reachable()?;
        let store = self.store.borrow();
        Ok(find(&store.server_roles, lookup, |r| r.id).cloned())
    }

    fn user(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<UserRow>> {
        self.read_database(database, |db| find(&db.users, lookup, |u| u.id).cloned())
    }

    fn database_role(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<RoleRow>> {
        self.read_database(database, |db| find(&db.roles, lookup, |r| r.id).cloned())
    }

    fn schema(&self, database: &str, lookup: Lookup<'_>) -> Result<Option<SchemaRow>> {
        self.read_database(database, |db| find(&db.schemas, lookup, |s| s.id).cloned())
    }

    fn member_roles(&self, database: &str, member: &str) -> Result<Vec<String>> {
        self.read_database(database, |db| {
            db.members
                .iter()
                .filter(|(_, m)| m == member)
                .map(|(r, _)| r.clone())
                .collect()
        })
    }

    fn is_role_member(&self, scope: &RoleScope, role: &str, member: &str) -> Result<bool> {
        let key = (role.to_string(), member.to_string());
        match scope {
            RoleScope::Server => {
                self.check_reachable()?;
                Ok(self.store.borrow().server_members.contains(&key))
            }
            RoleScope::Database(database) => {
                self.read_database(database, |db| db.members.contains(&key))
            }
        }
    }

    fn grant(
        &self,
        scope: &ScopeLocator,
        principal: &str,
        permission: &str,
    ) -> Result<Option<GrantRow>> {
        let row = |with_grant_option: bool| GrantRow {
            principal: principal.to_string(),
            permission: permission.to_string(),
            with_grant_option,
        };
        let key = (principal.to_string(), permission.to_string());
        match scope {
            ScopeLocator::Server => {
                self.check_reachable()?;
                Ok(self.store.borrow().server_grants.get(&key).map(|w| row(*w)))
            }
            ScopeLocator::Database { database } => self.read_database(database, |db| {
                db.grants.get(&(None, key.0, key.1)).map(|w| row(*w))
            }),
            ScopeLocator::Schema { database, schema } => self.read_database(database, |db| {
                db.grants
                    .get(&(Some(schema.clone()), key.0, key.1))
                    .map(|w| row(*w))
            }),
        }
    }

    fn execute(&self, command: &Command) -> Result<()> {
        self.check_reachable()?;
        self.log.borrow_mut().push(command.clone());
        log::debug!("[{}] {command}", command.target());

        let sql = command.to_sql();
        let injected = self
            .failures
            .borrow()
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, message)| message.clone());

        let outcome = match injected {
            Some(message) => Err(message),
            None => self.apply(command),
        };

        outcome.map_err(|message| Error::EngineCommandFailure {
            statement: command.redacted(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Permission;

    fn create_login(name: &str) -> Command {
        Command::CreateLogin {
            name: name.into(),
            password: "Secret-123".into(),
            default_database: "master".into(),
            default_language: None,
            check_expiration: false,
            check_policy: true,
        }
    }

    #[test]
    fn test_recreate_assigns_new_id() {
        let engine = MemoryEngine::new();
        engine.execute(&create_login("app")).unwrap();
        let first = engine.login(Lookup::Name("app")).unwrap().unwrap().id;

        engine
            .execute(&Command::DropLogin { name: "app".into() })
            .unwrap();
        engine.execute(&create_login("app")).unwrap();
        let second = engine.login(Lookup::Name("app")).unwrap().unwrap().id;

        assert_ne!(first, second);
        assert!(engine.login(Lookup::Id(first)).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_login_rejected_verbatim() {
        let engine = MemoryEngine::new();
        engine.execute(&create_login("app")).unwrap();
        let err = engine.execute(&create_login("app")).unwrap_err();
        match err {
            Error::EngineCommandFailure { message, .. } => {
                assert_eq!(message, "The server principal 'app' already exists.");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(engine.commands().len(), 2);
    }

    #[test]
    fn test_new_database_has_dbo_and_fixed_roles() {
        let engine = MemoryEngine::new().with_database("app");
        assert!(engine.user("app", Lookup::Name("dbo")).unwrap().is_some());
        let reader = engine
            .database_role("app", Lookup::Name("db_datareader"))
            .unwrap()
            .unwrap();
        assert!(reader.is_fixed);
        assert_eq!(
            engine.schema_owner("app", "dbo").unwrap().as_deref(),
            Some("dbo")
        );
    }

    #[test]
    fn test_grant_option_is_sticky_until_revoke() {
        let engine = MemoryEngine::new().with_database("app");
        engine.execute(&create_login("app_login")).unwrap();
        engine
            .execute(&Command::CreateUserForLogin {
                database: "app".into(),
                name: "app_user".into(),
                login: "app_login".into(),
                default_schema: "dbo".into(),
            })
            .unwrap();
        let scope = ScopeLocator::Database {
            database: "app".into(),
        };
        let grant = |w| Command::Grant {
            scope: scope.clone(),
            permission: Permission::parse("SELECT").unwrap(),
            principal: "app_user".into(),
            with_grant_option: w,
        };
        engine.execute(&grant(true)).unwrap();
        engine.execute(&grant(false)).unwrap();
        assert!(
            engine
                .grant(&scope, "app_user", "SELECT")
                .unwrap()
                .unwrap()
                .with_grant_option
        );

        engine
            .execute(&Command::Revoke {
                scope: scope.clone(),
                permission: Permission::parse("SELECT").unwrap(),
                principal: "app_user".into(),
                cascade: false,
            })
            .unwrap();
        assert!(engine.grant(&scope, "app_user", "SELECT").unwrap().is_none());
    }

    #[test]
    fn test_grant_to_schema_owner_rejected() {
        let engine = MemoryEngine::new().with_database("app");
        let err = engine
            .execute(&Command::Grant {
                scope: ScopeLocator::Schema {
                    database: "app".into(),
                    schema: "dbo".into(),
                },
                permission: Permission::parse("SELECT").unwrap(),
                principal: "dbo".into(),
                with_grant_option: false,
            })
            .unwrap_err();
        assert!(err.to_string().contains("entity owner"));
    }

    #[test]
    fn test_injected_failure_and_unreachable() {
        let engine = MemoryEngine::new();
        engine.fail_when("CREATE LOGIN", "Password validation failed.");
        let err = engine.execute(&create_login("app")).unwrap_err();
        assert!(err.to_string().contains("Password validation failed."));
        assert!(engine.login(Lookup::Name("app")).unwrap().is_none());

        engine.clear_failures();
        engine.set_unreachable(true);
        assert!(matches!(
            engine.login(Lookup::Name("sa")),
            Err(Error::ConnectionUnavailable { .. })
        ));
    }

    #[test]
    fn test_missing_database_read_is_engine_error() {
        let engine = MemoryEngine::new();
        assert!(matches!(
            engine.user("nope", Lookup::Name("x")),
            Err(Error::EngineCommandFailure { .. })
        ));
    }

    #[test]
    fn test_drop_user_owning_schema_rejected() {
        let engine = MemoryEngine::new().with_database("app");
        engine
            .execute(&Command::CreateExternalUser {
                database: "app".into(),
                name: "owner".into(),
                sid: None,
                default_schema: "dbo".into(),
            })
            .unwrap();
        engine
            .execute(&Command::CreateSchema {
                database: "app".into(),
                name: "sales".into(),
                owner: Some("owner".into()),
            })
            .unwrap();
        assert!(
            engine
                .execute(&Command::DropUser {
                    database: "app".into(),
                    name: "owner".into()
                })
                .is_err()
        );
    }
}
