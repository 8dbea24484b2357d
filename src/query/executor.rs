//! Query execution with safety classification.
//!
//! Classifies SQL before any connection is opened, runs approved SQL on a
//! fresh connection with a fixed row cap, and always closes that
//! connection afterwards.

use tracing::info;

use crate::config::ConnectionSpec;
use crate::db::{release, Connector, DatabaseClient, ExecutionResult};
use crate::error::{Result, WardenError};
use crate::safety::classify_sql;

/// Maximum rows read back from a single statement.
pub const MAX_ROWS: usize = 100;

/// Query executor that handles SQL classification and execution.
pub struct QueryExecutor<'a> {
    connector: &'a dyn Connector,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new query executor opening connections through `connector`.
    pub fn new(connector: &'a dyn Connector) -> Self {
        Self { connector }
    }

    /// Classifies and executes a query.
    ///
    /// Rejected SQL fails with [`WardenError::Rejected`] without touching the
    /// database. Engine errors are returned as-is; no partial result is kept.
    pub async fn execute(&self, spec: &ConnectionSpec, sql: &str) -> Result<ExecutionResult> {
        let classification = classify_sql(sql);
        if !classification.allowed {
            info!(connection = %spec.name, reason = %classification.reason, "Query rejected");
            return Err(WardenError::rejected(classification.reason));
        }

        let client = self.connector.connect(spec).await?;
        let result = run(client.as_ref(), statement_text(sql)).await;
        release(client.as_ref()).await;

        match &result {
            Ok(r) => info!(
                connection = %spec.name,
                rows = r.row_count(),
                truncated = r.truncated,
                "Query executed"
            ),
            Err(e) => info!(connection = %spec.name, error = %e, "Query failed"),
        }
        result
    }
}

/// Statement text as sent to the engine: trimmed, trailing semicolons removed.
fn statement_text(sql: &str) -> &str {
    sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .trim_start()
}

async fn run(client: &dyn DatabaseClient, sql: &str) -> Result<ExecutionResult> {
    let mut result = client.execute_query(sql, MAX_ROWS).await?;
    if result.rows.len() > MAX_ROWS {
        result.rows.truncate(MAX_ROWS);
        result.truncated = true;
    }
    Ok(result)
}
