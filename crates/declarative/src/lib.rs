//! # Declarative
//!
//! A framework for declarative resource lifecycles.
//!
//! Resources declare a desired state. Applying one leaves an observed
//! record behind, tracked in a [`Ledger`] between runs. Each run refreshes
//! the ledger against the live system, plans the difference and executes
//! it.
//!
//! ## Core Concepts
//!
//! - **Resource**: A declaration that can be materialized, diffed and converged
//! - **Observed**: A tracked record that can be refreshed and dematerialized
//! - **Ledger**: Ordered `(address, state)` entries persisted by the host
//! - **Plan**: Refreshed ledger plus the change for every resource
//! - **Executor**: Applies a plan change by change, updating the ledger
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{plan, execute, ExecuteOptions, NoProgress, AutoConfirm};
//!
//! let plan = plan(&resources, &ledger, &conn)?
//!     .filter_by_target(target, default_type_matcher);
//! let run = execute(plan, &conn, &ExecuteOptions::default(), &mut NoProgress, &mut AutoConfirm)?;
//! save(&run.ledger)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod diff;
pub mod executor;
pub mod ledger;
pub mod planner;
pub mod resource;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, Phase, ProgressCallback};
pub use diff::{Diff, DiffSummary, group_by_type};
pub use executor::{Execution, execute, execute_simple};
pub use ledger::{Entry, Ledger};
pub use planner::{
    Action, Plan, PlannedChange, TypeMatcher, default_type_matcher, plan, plan_destroy,
};
pub use resource::{Observed, Resource};
pub use types::{ApplyResult, ExecuteOptions, ExecuteSummary, Refresh};
