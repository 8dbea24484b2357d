//! Database abstraction layer for db-warden.
//!
//! Provides trait-based interfaces for metadata discovery and statement
//! execution so that the live drivers and the in-memory mock can be used
//! interchangeably.

pub mod dialect;
pub mod harvest;
mod mock;
mod mysql;
mod postgres;
mod schema;
mod types;

pub use dialect::{primary_database, resolve_scan_targets, Engine, ScanTarget};
pub use harvest::harvest;
pub use mock::{FailingConnector, MockConnector, MockDatabaseClient, MockStats};
pub use mysql::MySqlClient;
pub use postgres::PostgresClient;
pub use schema::{parse_nullable, ColumnOverview, SchemaOverview, TableEntry, TableOverview};
pub use types::{ExecutionResult, Row, Value};

use crate::config::{ConnectionSpec, Limits};
use crate::error::Result;
use async_trait::async_trait;
use tracing::warn;

/// Metadata access on an open connection.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Lists base tables under a catalog, optionally restricted to one schema.
    ///
    /// A `None` schema pattern lists every schema of the catalog.
    async fn list_tables(
        &self,
        catalog: &str,
        schema_pattern: Option<&str>,
    ) -> Result<Vec<TableEntry>>;

    /// Lists the columns of a table in ordinal order.
    async fn list_columns(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnOverview>>;

    /// Runs an engine-specific column query binding `schema` then `table`.
    ///
    /// Sources that cannot run such queries return no rows.
    async fn query_columns(
        &self,
        _sql: &str,
        _schema: &str,
        _table: &str,
    ) -> Result<Vec<ColumnOverview>> {
        Ok(Vec::new())
    }
}

/// An open, single connection to a target database.
///
/// All operations are async and return Results with WardenError.
#[async_trait]
pub trait DatabaseClient: MetadataSource {
    /// The engine this client talks to.
    fn engine(&self) -> Engine;

    /// Executes a statement, reading at most `max_rows` rows.
    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<ExecutionResult>;

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}

/// Opens connections for a [`ConnectionSpec`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens exactly one connection.
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn DatabaseClient>>;
}

/// Connector backed by the sqlx drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector {
    limits: Limits,
}

impl DriverConnector {
    /// Creates a connector applying the given limits.
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn DatabaseClient>> {
        connect(spec, &self.limits).await
    }
}

/// Creates a database client for the given connection spec.
///
/// This is the central factory function for database connections.
pub async fn connect(spec: &ConnectionSpec, limits: &Limits) -> Result<Box<dyn DatabaseClient>> {
    spec.validate()?;
    match spec.engine {
        Engine::PostgreSql => {
            let client = PostgresClient::connect(spec, limits).await?;
            Ok(Box::new(client))
        }
        Engine::MySql | Engine::MariaDb => {
            let client = MySqlClient::connect(spec, limits).await?;
            Ok(Box::new(client))
        }
    }
}

/// Closes a connection, logging rather than surfacing close failures.
pub async fn release(client: &dyn DatabaseClient) {
    if let Err(e) = client.close().await {
        warn!(error = %e, "Failed to close connection");
    }
}
