//! Integration tests for db-warden.

pub mod connection_test;
pub mod query_test;
pub mod safety_test;
pub mod schema_test;
