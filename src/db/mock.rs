//! Mock database client for testing.
//!
//! Provides an in-memory metadata source and canned query results so the
//! harvester, tester and executor can be exercised without a live engine.

use super::{
    ColumnOverview, Connector, DatabaseClient, Engine, ExecutionResult, MetadataSource,
    TableEntry, Value,
};
use crate::config::ConnectionSpec;
use crate::error::{Result, WardenError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counters shared between a [`MockConnector`] and the clients it opens.
#[derive(Debug, Default)]
pub struct MockStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    last_max_rows: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl MockStats {
    /// Number of connections opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Row cap passed to the most recent execution.
    pub fn last_max_rows(&self) -> usize {
        self.last_max_rows.load(Ordering::SeqCst)
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct MockTable {
    catalog: String,
    entry: TableEntry,
    columns: Vec<ColumnOverview>,
}

/// A mock database client that returns predefined metadata and results.
#[derive(Debug, Clone)]
pub struct MockDatabaseClient {
    engine: Engine,
    tables: Vec<MockTable>,
    enriched: HashMap<(String, String), Vec<ColumnOverview>>,
    enriched_fails: bool,
    listing_error: Option<String>,
    results: HashMap<String, std::result::Result<ExecutionResult, String>>,
    stats: Arc<MockStats>,
}

impl MockDatabaseClient {
    /// Creates a new mock client with no tables.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            tables: Vec::new(),
            enriched: HashMap::new(),
            enriched_fails: false,
            listing_error: None,
            results: HashMap::new(),
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Adds a table under a catalog with the columns the generic listing returns.
    pub fn with_table(
        mut self,
        catalog: impl Into<String>,
        entry: TableEntry,
        columns: Vec<ColumnOverview>,
    ) -> Self {
        self.tables.push(MockTable {
            catalog: catalog.into(),
            entry,
            columns,
        });
        self
    }

    /// Sets the rows the enriched column query returns for a table.
    pub fn with_enriched_columns(
        mut self,
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnOverview>,
    ) -> Self {
        self.enriched.insert((schema.into(), table.into()), columns);
        self
    }

    /// Makes the enriched column query fail, as it does without catalog permissions.
    pub fn with_failing_enriched_query(mut self) -> Self {
        self.enriched_fails = true;
        self
    }

    /// Makes every table listing fail with the given message.
    pub fn with_listing_error(mut self, message: impl Into<String>) -> Self {
        self.listing_error = Some(message.into());
        self
    }

    /// Registers the result returned for a statement.
    pub fn with_query_result(mut self, sql: &str, result: ExecutionResult) -> Self {
        self.results.insert(sql.trim().to_string(), Ok(result));
        self
    }

    /// Registers an engine error returned for a statement.
    pub fn with_query_error(mut self, sql: &str, message: impl Into<String>) -> Self {
        self.results
            .insert(sql.trim().to_string(), Err(message.into()));
        self
    }

    /// Returns the counters shared with connectors and clones.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl MetadataSource for MockDatabaseClient {
    async fn list_tables(
        &self,
        catalog: &str,
        schema_pattern: Option<&str>,
    ) -> Result<Vec<TableEntry>> {
        if let Some(message) = &self.listing_error {
            return Err(WardenError::query(message.clone()));
        }

        Ok(self
            .tables
            .iter()
            .filter(|t| t.catalog == catalog)
            .filter(|t| match schema_pattern {
                Some(pattern) => t.entry.schema.as_deref() == Some(pattern),
                None => true,
            })
            .map(|t| t.entry.clone())
            .collect())
    }

    async fn list_columns(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnOverview>> {
        Ok(self
            .tables
            .iter()
            .find(|t| {
                let schema_matches = match t.entry.schema.as_deref().map(str::trim) {
                    Some(label) if !label.is_empty() => label == schema,
                    _ => true,
                };
                t.catalog == catalog && t.entry.name == table && schema_matches
            })
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn query_columns(
        &self,
        _sql: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnOverview>> {
        if self.enriched_fails {
            return Err(WardenError::query(
                "permission denied for table pg_description",
            ));
        }
        Ok(self
            .enriched
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<ExecutionResult> {
        self.stats.last_max_rows.store(max_rows, Ordering::SeqCst);
        if let Ok(mut executed) = self.stats.executed.lock() {
            executed.push(sql.to_string());
        }

        match self.results.get(sql.trim()) {
            Some(Ok(result)) => {
                let mut result = result.clone();
                if result.rows.len() > max_rows {
                    result.rows.truncate(max_rows);
                    result.truncated = true;
                }
                Ok(result)
            }
            Some(Err(message)) => Err(WardenError::query(message.clone())),
            None => Ok(ExecutionResult::with_data(
                vec!["result".to_string()],
                vec![vec![Value::String(format!("Mock result for: {sql}"))]],
            )),
        }
    }

    async fn close(&self) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that hands out clones of a mock client.
#[derive(Debug, Clone)]
pub struct MockConnector {
    client: MockDatabaseClient,
}

impl MockConnector {
    /// Creates a connector for the given mock client.
    pub fn new(client: MockDatabaseClient) -> Self {
        Self { client }
    }

    /// Returns the counters shared with every opened client.
    pub fn stats(&self) -> Arc<MockStats> {
        self.client.stats()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _spec: &ConnectionSpec) -> Result<Box<dyn DatabaseClient>> {
        self.client.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.client.clone()))
    }
}

/// Connector whose connection attempts always fail.
#[derive(Debug, Clone)]
pub struct FailingConnector {
    message: String,
}

impl FailingConnector {
    /// Creates a connector failing with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Connector for FailingConnector {
    async fn connect(&self, _spec: &ConnectionSpec) -> Result<Box<dyn DatabaseClient>> {
        Err(WardenError::connection(self.message.clone()))
    }
}
