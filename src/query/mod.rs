//! Query execution for db-warden.
//!
//! Runs classifier-approved SQL against a target database and returns
//! typed rows.

pub mod executor;

pub use executor::{QueryExecutor, MAX_ROWS};
