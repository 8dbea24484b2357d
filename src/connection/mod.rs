//! Connection probing for db-warden.
//!
//! Opens a single connection per call, discovers the schema behind it and
//! releases the connection before returning.

pub mod tester;

pub use tester::{fetch_schema, ConnectionTester, DbTestResult};
