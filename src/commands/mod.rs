// Plan, apply, refresh and destroy
pub mod declarative;

// Ledger maintenance
pub mod import;
pub mod state;

// Utilities
pub mod show;
pub mod sid;
