//! Transport abstraction for reaching the engine.
//!
//! The [`Transport`] trait is the only place statements leave the process,
//! allowing for different implementations (the `sqlcmd` tool, or an
//! in-process fake for testing).

pub mod sqlcmd;

use crate::error::{Error, Result};
use crate::types::Target;

/// One result row; `None` is SQL `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row(Vec<Option<String>>);

impl Row {
    pub fn new(columns: Vec<Option<String>>) -> Self {
        Self(columns)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Nullable text column.
    pub fn get_opt_str(&self, index: usize) -> Result<Option<&str>> {
        self.0
            .get(index)
            .map(Option::as_deref)
            .ok_or_else(|| Error::Catalog(format!("row has no column {index}")))
    }

    /// Non-null text column.
    pub fn get_str(&self, index: usize) -> Result<&str> {
        self.get_opt_str(index)?
            .ok_or_else(|| Error::Catalog(format!("column {index} is NULL")))
    }

    pub fn get_i32(&self, index: usize) -> Result<i32> {
        let raw = self.get_str(index)?;
        raw.trim()
            .parse()
            .map_err(|_| Error::Catalog(format!("column {index}: '{raw}' is not an integer")))
    }

    /// Bit column; accepts `1`/`0` and `true`/`false`.
    pub fn get_bool(&self, index: usize) -> Result<bool> {
        let raw = self.get_str(index)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(Error::Catalog(format!(
                "column {index}: '{raw}' is not a bit value"
            ))),
        }
    }
}

/// Backend trait for running statements against the engine.
pub trait Transport {
    /// Run a statement and collect its rows.
    fn query(&self, target: &Target, sql: &str) -> Result<Vec<Row>>;

    /// Run a statement for its side effects.
    fn execute(&self, target: &Target, sql: &str) -> Result<()> {
        self.query(target, sql).map(|_| ())
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn query(&self, target: &Target, sql: &str) -> Result<Vec<Row>> {
        (**self).query(target, sql)
    }

    fn execute(&self, target: &Target, sql: &str) -> Result<()> {
        (**self).execute(target, sql)
    }
}
