//! Terminal front end for the declarative engine

pub mod differ;
pub mod progress;
