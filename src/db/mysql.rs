//! MySQL and MariaDB database client implementation.
//!
//! Both engines speak the same wire protocol and expose the same
//! `information_schema` layout, so one client serves both. Every database
//! is its own catalog; there is no schema level below it.

use crate::config::{ConnectionSpec, Limits};
use crate::db::{
    parse_nullable, ColumnOverview, DatabaseClient, Engine, ExecutionResult, MetadataSource, Row,
    TableEntry, Value,
};
use crate::error::{Result, WardenError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column as SqlxColumn, Connection, Decode, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const LIST_TABLES: &str = r#"
    SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_COMMENT
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

const LIST_COLUMNS: &str = r#"
    SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_COMMENT
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

/// MySQL / MariaDB database client.
#[derive(Debug)]
pub struct MySqlClient {
    engine: Engine,
    conn: Mutex<Option<MySqlConnection>>,
    statement_timeout: Duration,
}

impl MySqlClient {
    /// Opens one connection to the spec's primary database and applies the
    /// session statement timeout.
    pub async fn connect(spec: &ConnectionSpec, limits: &Limits) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&spec.host)
            .port(spec.effective_port())
            .username(&spec.username)
            .password(&spec.password)
            .database(spec.primary_database());

        debug!(connection = %spec.display_string(), "Connecting to {}", spec.engine);

        let mut conn =
            tokio::time::timeout(limits.connect_timeout(), MySqlConnection::connect_with(&options))
                .await
                .map_err(|_| {
                    WardenError::connection(format!(
                        "Connection to {}:{} timed out. The server may be overloaded or unreachable.",
                        spec.host,
                        spec.effective_port()
                    ))
                })?
                .map_err(|e| map_connection_error(e, spec))?;

        let timeout_sql = session_timeout_statement(spec.engine, limits.statement_timeout());
        if let Err(e) = (&mut conn).execute(timeout_sql.as_str()).await {
            warn!(error = %e, "Could not set session statement timeout");
        }

        debug!("Successfully connected to database");
        Ok(Self {
            engine: spec.engine,
            conn: Mutex::new(Some(conn)),
            statement_timeout: limits.statement_timeout(),
        })
    }
}

/// Builds the session statement that caps statement run time.
///
/// MySQL counts `max_execution_time` in milliseconds; MariaDB counts
/// `max_statement_time` in seconds.
fn session_timeout_statement(engine: Engine, timeout: Duration) -> String {
    match engine {
        Engine::MariaDb => format!("SET SESSION max_statement_time = {}", timeout.as_secs()),
        _ => format!("SET SESSION max_execution_time = {}", timeout.as_millis()),
    }
}

fn live(conn: &mut Option<MySqlConnection>) -> Result<&mut MySqlConnection> {
    conn.as_mut()
        .ok_or_else(|| WardenError::connection("Connection is closed"))
}

/// Reads a string cell.
///
/// Some server charset configurations return `information_schema` text as
/// VARBINARY, so raw bytes are accepted too.
fn get_string(row: &MySqlRow, index: usize) -> Option<String> {
    row.try_get::<Option<String>, _>(index)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(index)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

#[async_trait]
impl MetadataSource for MySqlClient {
    async fn list_tables(
        &self,
        catalog: &str,
        schema_pattern: Option<&str>,
    ) -> Result<Vec<TableEntry>> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let rows = sqlx::query(LIST_TABLES)
            .bind(schema_pattern.unwrap_or(catalog))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| WardenError::query(format!("Failed to fetch tables: {e}")))?;

        let tables: Vec<TableEntry> = rows
            .iter()
            .filter_map(|row| {
                let name = get_string(row, 1).filter(|n| !n.is_empty())?;
                Some(TableEntry {
                    schema: get_string(row, 0),
                    name,
                    comment: get_string(row, 2).filter(|c| !c.trim().is_empty()),
                })
            })
            .collect();

        debug!(catalog, count = tables.len(), "Listed tables");
        Ok(tables)
    }

    async fn list_columns(
        &self,
        catalog: &str,
        _schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnOverview>> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let rows = sqlx::query(LIST_COLUMNS)
            .bind(catalog)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                WardenError::query(format!("Failed to fetch columns for {catalog}.{table}: {e}"))
            })?;

        Ok(rows
            .iter()
            .map(|row| ColumnOverview {
                name: get_string(row, 0).unwrap_or_default(),
                data_type: get_string(row, 1).unwrap_or_default(),
                nullable: get_string(row, 2).is_some_and(|flag| parse_nullable(&flag)),
                comment: get_string(row, 3).filter(|c| !c.trim().is_empty()),
            })
            .collect())
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<ExecutionResult> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let read = async {
            let mut columns = Vec::new();
            let mut rows = Vec::new();
            let mut truncated = false;

            let mut stream = sqlx::query(sql).fetch(&mut *conn);
            while let Some(row) = stream.try_next().await? {
                if columns.is_empty() {
                    columns = row
                        .columns()
                        .iter()
                        .map(|col| col.name().to_string())
                        .collect();
                }
                if rows.len() == max_rows {
                    truncated = true;
                    break;
                }
                rows.push(convert_row(&row).map_err(sqlx::Error::Decode)?);
            }
            Ok::<_, sqlx::Error>((columns, rows, truncated))
        };

        let (mut columns, rows, truncated) = tokio::time::timeout(self.statement_timeout, read)
            .await
            .map_err(|_| {
                WardenError::query(format!(
                    "Query timed out after {} seconds",
                    self.statement_timeout.as_secs()
                ))
            })?
            .map_err(|e| WardenError::query(format_query_error(e)))?;

        if columns.is_empty() {
            match (&mut *conn).describe(sql).await {
                Ok(described) => {
                    columns = described
                        .columns()
                        .iter()
                        .map(|col| col.name().to_string())
                        .collect();
                }
                Err(e) => debug!(error = %e, "Could not describe statement"),
            }
        }

        if truncated {
            warn!("Query returned more than {} rows, truncating", max_rows);
        }

        Ok(ExecutionResult {
            columns,
            rows,
            truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close()
                .await
                .map_err(|e| WardenError::connection(format!("Failed to close connection: {e}")))?;
        }
        Ok(())
    }
}

fn convert_row(row: &MySqlRow) -> std::result::Result<Row, BoxDynError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

fn get<T>(row: &MySqlRow, index: usize) -> Option<T>
where
    T: for<'r> sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Converts a single column value from a MySqlRow to our Value type.
///
/// Only SQL NULL becomes [`Value::Null`].
fn convert_value(
    row: &MySqlRow,
    index: usize,
    type_name: &str,
) -> std::result::Result<Value, BoxDynError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let upper = type_name.to_uppercase();
    let value = match upper.as_str() {
        "BOOLEAN" => get::<bool>(row, index).map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            get::<i64>(row, index).map(Value::Int)
        }
        t if t.ends_with(" UNSIGNED") => get::<u64>(row, index).map(Value::UInt),
        "FLOAT" => get::<f32>(row, index).map(|v| Value::Float(v.into())),
        "DOUBLE" => get::<f64>(row, index).map(Value::Float),
        "DECIMAL" => get::<Decimal>(row, index).map(Value::Decimal),
        "DATE" => get::<NaiveDate>(row, index).map(Value::Date),
        "TIME" => get::<NaiveTime>(row, index).map(Value::Time),
        "DATETIME" => get::<NaiveDateTime>(row, index).map(Value::DateTime),
        "TIMESTAMP" => get::<DateTime<Utc>>(row, index).map(Value::Timestamp),
        "JSON" => get::<serde_json::Value>(row, index).map(Value::Json),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            get::<Vec<u8>>(row, index).map(Value::Bytes)
        }
        _ => None,
    };

    // Out-of-range temporals (e.g. TIME '838:59:59') and everything else
    // come back as text.
    match value.or_else(|| get_string(row, index).map(Value::String)) {
        Some(value) => Ok(value),
        None => Ok(Value::from_wire(<&[u8] as Decode<MySql>>::decode(raw)?)),
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, spec: &ConnectionSpec) -> WardenError {
    let host = &spec.host;
    let port = spec.effective_port();
    let database = spec.primary_database();

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        WardenError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("access denied") {
        WardenError::connection(format!(
            "Authentication failed for user '{}'. Check your credentials.",
            spec.username
        ))
    } else if error_str.contains("unknown database") {
        WardenError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        WardenError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        WardenError::connection(error.to_string())
    }
}

/// Formats a query error with the server's error code when present.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => match db_error.code() {
            Some(code) => format!("ERROR {code}: {}", db_error.message()),
            None => format!("ERROR: {}", db_error.message()),
        },
        None => error.to_string(),
    }
}
