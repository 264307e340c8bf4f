//! Lifecycle traits for declarative resources
//!
//! A [`Resource`] is a declared desired state. Once applied it leaves an
//! [`Observed`] record behind, which is what gets tracked between runs.
//! Tracked records can be refreshed and destroyed without the declaration
//! that produced them, so entries removed from configuration can still be
//! cleaned up.

use crate::diff::Diff;
use crate::types::Refresh;
use anyhow::Result;
use std::fmt;

/// Core trait for declared resources
///
/// Every operation receives the connection handle explicitly; no state is
/// kept between calls.
///
/// # Example
///
/// ```ignore
/// impl Resource for Setting {
///     type State = SettingState;
///     type Conn = Store;
///
///     fn address(&self) -> String { format!("setting.{}", self.key) }
///     fn resource_type(&self) -> &'static str { "setting" }
///     fn description(&self) -> String { format!("Set {} = {}", self.key, self.value) }
///
///     fn materialize(&self, store: &Store) -> Result<SettingState> {
///         store.set(&self.key, &self.value);
///         Ok(SettingState { key: self.key.clone(), value: self.value.clone() })
///     }
///     // ...
/// }
/// ```
pub trait Resource: fmt::Debug {
    /// Record left behind once the resource exists
    type State: Observed<Conn = Self::Conn>;

    /// Handle to the live system
    type Conn: ?Sized;

    /// Unique, stable address of this resource, e.g. `"sql_login.app"`
    fn address(&self) -> String;

    /// Resource type category
    ///
    /// Used for grouping and filtering.
    fn resource_type(&self) -> &'static str;

    /// Human-readable description of what this resource declares
    fn description(&self) -> String;

    /// Create the resource and return its canonical state
    fn materialize(&self, conn: &Self::Conn) -> Result<Self::State>;

    /// Read an existing resource without changing it
    ///
    /// Returns `None` when nothing matches the declaration.
    fn import(&self, conn: &Self::Conn) -> Result<Option<Self::State>>;

    /// Compare the declaration against a refreshed state
    fn diff(&self, state: &Self::State) -> Diff;

    /// Converge mutable attributes in place and return the re-read state
    fn converge(&self, state: &Self::State, conn: &Self::Conn) -> Result<Self::State>;
}

/// A tracked record of something that exists on the live system
pub trait Observed: Clone + fmt::Debug {
    /// Handle to the live system
    type Conn: ?Sized;

    /// Resource type category of the record
    fn resource_type(&self) -> &'static str;

    /// One-line summary for listings
    fn summary(&self) -> String;

    /// Re-read the record, following renames of internal ids
    fn refresh(&self, conn: &Self::Conn) -> Result<Refresh<Self>>;

    /// Destroy what the record describes
    fn dematerialize(&self, conn: &Self::Conn) -> Result<()>;
}
