//! Connection probing and schema discovery.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ConnectionSpec;
use crate::db::{harvest, release, resolve_scan_targets, Connector, DatabaseClient, SchemaOverview};
use crate::error::Result;

/// Outcome of probing a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbTestResult {
    /// Whether the connection and schema discovery succeeded.
    pub success: bool,
    /// Human-readable summary or diagnostic.
    pub message: String,
    /// Discovered schema, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaOverview>,
}

impl DbTestResult {
    fn succeeded(schema: SchemaOverview) -> Self {
        Self {
            success: true,
            message: format!(
                "Connection successful. Found {} tables.",
                schema.table_count()
            ),
            schema: Some(schema),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            schema: None,
        }
    }
}

/// Probes connections by harvesting their schema.
pub struct ConnectionTester<'a> {
    connector: &'a dyn Connector,
}

impl<'a> ConnectionTester<'a> {
    /// Creates a tester opening connections through `connector`.
    pub fn new(connector: &'a dyn Connector) -> Self {
        Self { connector }
    }

    /// Tests a connection.
    ///
    /// Never fails: connection, authentication and engine errors are
    /// reported through an unsuccessful [`DbTestResult`].
    pub async fn test(&self, spec: &ConnectionSpec) -> DbTestResult {
        match fetch_schema(self.connector, spec).await {
            Ok(schema) => {
                info!(
                    connection = %spec.name,
                    tables = schema.table_count(),
                    "Connection test succeeded"
                );
                DbTestResult::succeeded(schema)
            }
            Err(e) => {
                warn!(connection = %spec.name, error = %e, "Connection test failed");
                DbTestResult::failed(format!("Connection failed: {}", e.message()))
            }
        }
    }
}

/// Opens one connection, harvests the schema, and closes the connection.
///
/// Unlike [`ConnectionTester::test`], errors propagate to the caller.
pub async fn fetch_schema(connector: &dyn Connector, spec: &ConnectionSpec) -> Result<SchemaOverview> {
    let client = connector.connect(spec).await?;
    let result = harvest_with(client.as_ref(), spec).await;
    release(client.as_ref()).await;
    result
}

async fn harvest_with(client: &dyn DatabaseClient, spec: &ConnectionSpec) -> Result<SchemaOverview> {
    let targets = resolve_scan_targets(spec.engine, &spec.database);
    harvest(client.engine(), spec.primary_database(), &targets, client).await
}
