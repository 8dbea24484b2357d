//! db-warden: schema discovery and read-only query gating for operator-owned
//! MySQL, MariaDB and PostgreSQL databases.
//!
//! This library exposes the core modules for the `warden` binary and for
//! integration tests.

pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod safety;
