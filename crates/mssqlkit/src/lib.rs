//! # mssqlkit
//!
//! Access-control reconciliation for SQL Server.
//!
//! This crate provides:
//! - Typed DDL/DCL statements with safe identifier quoting ([`Command`])
//! - Catalog reads with id-then-name resolution of volatile principal ids
//! - Owner-implied grant detection and a grant-option aware permission differ
//! - Role membership set differencing
//! - Entity lifecycles (databases, logins, users, roles, schemas, members,
//!   permissions) driven through the `declarative` framework
//!
//! ## Example
//!
//! ```no_run
//! use mssqlkit::{Authentication, ConnectionSettings, sqlcmd_catalog};
//! use mssqlkit::catalog::{Catalog, Lookup};
//!
//! let catalog = sqlcmd_catalog(ConnectionSettings {
//!     hostname: "localhost".into(),
//!     port: mssqlkit::DEFAULT_PORT,
//!     authentication: Authentication::AzureDefault,
//!     trust_server_certificate: false,
//! });
//! let login = catalog.login(Lookup::Name("app")).unwrap();
//! println!("{login:?}");
//! ```
//!
//! ## Testing
//!
//! With the `testing` feature, `MemoryEngine` implements [`Catalog`] in
//! memory with the engine's ownership and error behavior, and records every
//! statement it receives.

#![warn(clippy::all)]

pub mod catalog;
pub mod command;
pub mod entity;
pub mod error;
pub mod membership;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod ownership;
pub mod permission;
pub mod resolve;
pub mod sid;
pub mod transport;
pub mod types;

pub use catalog::{Catalog, Lookup, sql::SqlCatalog};
pub use command::{Command, Permission, quote_ident, quote_literal};
pub use entity::{Entity, EntityKind, EntitySpec, EntityState};
pub use error::{Error, ErrorCategory, Result};
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryEngine;
pub use sid::Sid;
pub use transport::sqlcmd::{Authentication, ConnectionSettings, DEFAULT_PORT, SqlcmdTransport};
pub use types::{RoleScope, ScopeLocator, Target};

/// Catalog backed by the `sqlcmd` tool.
pub fn sqlcmd_catalog(settings: ConnectionSettings) -> SqlCatalog<SqlcmdTransport> {
    SqlCatalog::new(SqlcmdTransport::new(settings))
}
