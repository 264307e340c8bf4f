//! Read-only lookup of a single object on the server, tracked or not

use anyhow::{Context as _, Result, bail};
use mssqlkit::catalog::Catalog;
use mssqlkit::{EntityKind, Lookup};

use crate::Context;
use crate::ui;

pub type Fields = Vec<(&'static str, String)>;

fn flag(value: bool) -> String {
    value.to_string()
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".into())
}

fn database_for(kind: EntityKind, database: Option<&str>) -> Result<&str> {
    database.with_context(|| format!("{kind} lookups need --database"))
}

/// Attributes of the named object, or `None` when it does not exist
pub fn describe<C: Catalog + ?Sized>(
    catalog: &C,
    kind: EntityKind,
    name: &str,
    database: Option<&str>,
) -> Result<Option<Fields>> {
    let lookup = Lookup::Name(name);
    let fields = match kind {
        EntityKind::Database => catalog
            .database(lookup)?
            .map(|row| vec![("id", row.id.to_string()), ("name", row.name)]),
        EntityKind::SqlLogin => catalog.login(lookup)?.map(|row| {
            vec![
                ("id", row.id.to_string()),
                ("name", row.name),
                ("default_database", row.default_database),
                ("default_language", row.default_language),
                ("check_expiration", flag(row.check_expiration)),
                ("check_policy", flag(row.check_policy)),
                ("disabled", flag(row.is_disabled)),
            ]
        }),
        EntityKind::ServerRole | EntityKind::DatabaseRole => {
            let row = if kind == EntityKind::ServerRole {
                catalog.server_role(lookup)?
            } else {
                catalog.database_role(database_for(kind, database)?, lookup)?
            };
            row.map(|row| {
                vec![
                    ("id", row.id.to_string()),
                    ("name", row.name),
                    ("owner", optional(row.owner)),
                    ("fixed", flag(row.is_fixed)),
                ]
            })
        }
        EntityKind::SqlUser | EntityKind::ExternalUser | EntityKind::ServicePrincipal => {
            let database = database_for(kind, database)?;
            match catalog.user(database, lookup)? {
                Some(row) => {
                    let roles = catalog.member_roles(database, &row.name)?;
                    Some(vec![
                        ("id", row.id.to_string()),
                        ("name", row.name),
                        ("type", row.user_type.code().to_string()),
                        ("default_schema", row.default_schema),
                        ("login_name", optional(row.login_name)),
                        ("sid", optional(row.sid)),
                        ("roles", roles.join(", ")),
                    ])
                }
                None => None,
            }
        }
        EntityKind::Schema => catalog
            .schema(database_for(kind, database)?, lookup)?
            .map(|row| {
                vec![
                    ("id", row.id.to_string()),
                    ("name", row.name),
                    ("owner", row.owner),
                ]
            }),
        EntityKind::ServerRoleMember
        | EntityKind::ServerPermission
        | EntityKind::DatabaseRoleMember
        | EntityKind::DatabasePermission
        | EntityKind::SchemaPermission => {
            bail!("{kind} is not a named object; use `aclsync state` for tracked ones")
        }
    };
    Ok(fields)
}

pub fn run(
    ctx: &Context,
    kind: &str,
    name: &str,
    database: Option<&str>,
    json: bool,
) -> Result<()> {
    let kind: EntityKind = kind.parse()?;
    let manifest = ctx.manifest()?;
    let catalog = ctx.catalog(&manifest)?;

    let fields = describe(&catalog, kind, name, database)?
        .with_context(|| format!("{kind} '{name}' does not exist on the server"))?;

    if json {
        let object: serde_json::Map<String, serde_json::Value> = fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.into()))
            .collect();
        let output =
            serde_json::to_string_pretty(&object).context("Could not serialize object")?;
        println!("{output}");
        return Ok(());
    }

    ui::header(&format!("{kind} {name}"));
    for (key, value) in &fields {
        ui::kv(key, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssqlkit::{Command, MemoryEngine, RoleScope};

    fn value<'a>(fields: &'a Fields, key: &str) -> &'a str {
        fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_describe_login() {
        let engine = MemoryEngine::new();
        engine
            .execute(&Command::CreateLogin {
                name: "app".into(),
                password: "Secret#1".into(),
                default_database: "master".into(),
                default_language: None,
                check_expiration: false,
                check_policy: true,
            })
            .unwrap();

        let fields = describe(&engine, EntityKind::SqlLogin, "app", None)
            .unwrap()
            .unwrap();
        assert_eq!(value(&fields, "name"), "app");
        assert_eq!(value(&fields, "default_database"), "master");
        assert_eq!(value(&fields, "check_policy"), "true");
        assert_eq!(engine.commands().len(), 1);
    }

    #[test]
    fn test_describe_fixed_database_role() {
        let engine = MemoryEngine::new().with_database("app");
        let fields = describe(&engine, EntityKind::DatabaseRole, "db_owner", Some("app"))
            .unwrap()
            .unwrap();
        assert_eq!(value(&fields, "fixed"), "true");
        assert!(
            describe(&engine, EntityKind::ServerRole, "sysadmin", None)
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_describe_user_lists_roles() {
        let engine = MemoryEngine::new().with_database("app");
        engine
            .execute(&Command::CreateLogin {
                name: "app".into(),
                password: "Secret#1".into(),
                default_database: "master".into(),
                default_language: None,
                check_expiration: false,
                check_policy: true,
            })
            .unwrap();
        engine
            .execute(&Command::CreateUserForLogin {
                database: "app".into(),
                name: "app".into(),
                login: "app".into(),
                default_schema: "dbo".into(),
            })
            .unwrap();
        engine
            .execute(&Command::AddRoleMember {
                scope: RoleScope::Database("app".into()),
                role: "db_datareader".into(),
                member: "app".into(),
            })
            .unwrap();

        let fields = describe(&engine, EntityKind::SqlUser, "app", Some("app"))
            .unwrap()
            .unwrap();
        assert_eq!(value(&fields, "login_name"), "app");
        assert_eq!(value(&fields, "roles"), "db_datareader");
    }

    #[test]
    fn test_describe_missing_and_unsupported() {
        let engine = MemoryEngine::new().with_database("app");
        assert!(
            describe(&engine, EntityKind::Schema, "sales", Some("app"))
                .unwrap()
                .is_none()
        );

        let no_database = describe(&engine, EntityKind::Schema, "dbo", None).unwrap_err();
        assert!(no_database.to_string().contains("--database"));

        let member = describe(&engine, EntityKind::DatabaseRoleMember, "x", Some("app"));
        assert!(member.unwrap_err().to_string().contains("not a named object"));
    }
}
