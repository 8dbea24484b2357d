//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases over a single sqlx connection.

use crate::config::{ConnectionSpec, Limits};
use crate::db::{
    parse_nullable, ColumnOverview, DatabaseClient, Engine, ExecutionResult, MetadataSource, Row,
    TableEntry, Value,
};
use crate::error::{Result, WardenError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{
    Column as SqlxColumn, Connection, Decode, Executor, Postgres, Row as SqlxRow, TypeInfo,
    ValueRef,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Lists base tables of the connected database, either for one schema or
/// for every non-system schema when `$2` is NULL.
const LIST_TABLES: &str = r#"
    SELECT
        t.table_schema::text,
        t.table_name::text,
        obj_description(
            format('%I.%I', t.table_schema, t.table_name)::regclass, 'pg_class'
        )::text
    FROM information_schema.tables t
    WHERE t.table_catalog = $1
        AND t.table_type = 'BASE TABLE'
        AND (
            ($2::text IS NULL AND t.table_schema NOT IN ('pg_catalog', 'information_schema'))
            OR t.table_schema = $2::text
        )
    ORDER BY t.table_schema, t.table_name
"#;

const LIST_COLUMNS: &str = r#"
    SELECT
        column_name::text,
        data_type::text,
        is_nullable::text
    FROM information_schema.columns
    WHERE table_catalog = $1 AND table_schema = $2 AND table_name = $3
    ORDER BY ordinal_position
"#;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    conn: Mutex<Option<PgConnection>>,
    statement_timeout: Duration,
}

impl PostgresClient {
    /// Opens one connection to the spec's primary database.
    ///
    /// The server-side `statement_timeout` is set from the limits as part of
    /// the startup parameters.
    pub async fn connect(spec: &ConnectionSpec, limits: &Limits) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&spec.host)
            .port(spec.effective_port())
            .username(&spec.username)
            .password(&spec.password)
            .database(spec.primary_database())
            .options([(
                "statement_timeout",
                limits.statement_timeout().as_millis().to_string(),
            )]);

        debug!(connection = %spec.display_string(), "Connecting to PostgreSQL");

        let conn = tokio::time::timeout(limits.connect_timeout(), PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                WardenError::connection(format!(
                    "Connection to {}:{} timed out. The server may be overloaded or unreachable.",
                    spec.host,
                    spec.effective_port()
                ))
            })?
            .map_err(|e| map_connection_error(e, spec))?;

        debug!("Successfully connected to database");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            statement_timeout: limits.statement_timeout(),
        })
    }
}

fn live(conn: &mut Option<PgConnection>) -> Result<&mut PgConnection> {
    conn.as_mut()
        .ok_or_else(|| WardenError::connection("Connection is closed"))
}

#[async_trait]
impl MetadataSource for PostgresClient {
    async fn list_tables(
        &self,
        catalog: &str,
        schema_pattern: Option<&str>,
    ) -> Result<Vec<TableEntry>> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(LIST_TABLES)
            .bind(catalog)
            .bind(schema_pattern)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| WardenError::query(format!("Failed to fetch tables: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(schema, name, comment)| TableEntry {
                schema: Some(schema),
                name,
                comment: comment.filter(|c| !c.trim().is_empty()),
            })
            .collect())
    }

    async fn list_columns(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnOverview>> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let rows: Vec<(String, String, String)> = sqlx::query_as(LIST_COLUMNS)
            .bind(catalog)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                WardenError::query(format!("Failed to fetch columns for {schema}.{table}: {e}"))
            })?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable)| {
                ColumnOverview::new(name, data_type).nullable(parse_nullable(&is_nullable))
            })
            .collect())
    }

    async fn query_columns(
        &self,
        sql: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnOverview>> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(sql)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| WardenError::query(format_query_error(e)))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, comment)| ColumnOverview {
                name,
                data_type,
                nullable: parse_nullable(&is_nullable),
                comment: comment.filter(|c| !c.trim().is_empty()),
            })
            .collect())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn engine(&self) -> Engine {
        Engine::PostgreSql
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
                    columns = column_names(&row);
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
            // No rows to read labels from; ask the server for the statement's shape.
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

fn column_names(row: &PgRow) -> Vec<String> {
    row.columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> std::result::Result<Row, BoxDynError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Decodes a cell already known to be non-null.
fn get<T>(row: &PgRow, index: usize) -> Option<T>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(index).ok()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Only SQL NULL becomes [`Value::Null`]. A non-null cell of a type without
/// a typed mapping is returned from its wire bytes.
fn convert_value(
    row: &PgRow,
    index: usize,
    type_name: &str,
) -> std::result::Result<Value, BoxDynError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let upper = type_name.to_uppercase();
    let value = match upper.as_str() {
        "BOOL" | "BOOLEAN" => get::<bool>(row, index).map(Value::Bool),
        "INT2" | "SMALLINT" => get::<i16>(row, index).map(Value::from),
        "INT4" | "INT" | "INTEGER" => get::<i32>(row, index).map(Value::from),
        "INT8" | "BIGINT" => get::<i64>(row, index).map(Value::Int),
        "OID" => get::<Oid>(row, index).map(|v| Value::UInt(v.0.into())),
        "FLOAT4" | "REAL" => get::<f32>(row, index).map(Value::from),
        "FLOAT8" | "DOUBLE PRECISION" => get::<f64>(row, index).map(Value::Float),
        "NUMERIC" => get::<Decimal>(row, index)
            .map(Value::Decimal)
            .or_else(|| get::<BigDecimal>(row, index).map(|v| Value::String(v.to_string())))
            .or_else(|| {
                raw.as_bytes()
                    .ok()
                    .and_then(numeric_special)
                    .map(|v| Value::String(v.to_string()))
            }),
        "DATE" => get::<NaiveDate>(row, index).map(Value::Date),
        "TIME" => get::<NaiveTime>(row, index).map(Value::Time),
        "TIMETZ" => get::<PgTimeTz<NaiveTime, FixedOffset>>(row, index)
            .map(|v| Value::String(format!("{}{}", v.time, v.offset))),
        "TIMESTAMP" => get::<NaiveDateTime>(row, index).map(Value::DateTime),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, index).map(Value::Timestamp),
        "INTERVAL" => get::<PgInterval>(row, index).map(|v| Value::String(format_interval(&v))),
        "INET" | "CIDR" => get::<IpNetwork>(row, index)
            .map(|v| Value::String(format_network(v, upper == "INET"))),
        "UUID" => get::<Uuid>(row, index).map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => get::<serde_json::Value>(row, index).map(Value::Json),
        "BYTEA" => get::<Vec<u8>>(row, index).map(Value::Bytes),
        // The single-byte "char" type, not CHAR(n).
        "\"CHAR\"" => {
            get::<i8>(row, index).map(|v| Value::String(char::from(v as u8).to_string()))
        }
        t if t.ends_with("[]") => convert_array(row, index, &t[..t.len() - 2]),
        _ => get::<String>(row, index).map(Value::String),
    };

    match value {
        Some(value) => Ok(value),
        None => Ok(Value::from_wire(<&[u8] as Decode<Postgres>>::decode(raw)?)),
    }
}

/// Converts a one-dimensional array of a common element type.
fn convert_array(row: &PgRow, index: usize, element: &str) -> Option<Value> {
    let items = match element {
        "BOOL" => elements(get::<Vec<Option<bool>>>(row, index)?),
        "INT2" => elements(get::<Vec<Option<i16>>>(row, index)?),
        "INT4" => elements(get::<Vec<Option<i32>>>(row, index)?),
        "INT8" => elements(get::<Vec<Option<i64>>>(row, index)?),
        "FLOAT4" => elements(get::<Vec<Option<f32>>>(row, index)?),
        "FLOAT8" => elements(get::<Vec<Option<f64>>>(row, index)?),
        "NUMERIC" => elements(get::<Vec<Option<Decimal>>>(row, index)?),
        "TEXT" | "VARCHAR" | "NAME" | "CHAR" => elements(get::<Vec<Option<String>>>(row, index)?),
        "DATE" => elements(get::<Vec<Option<NaiveDate>>>(row, index)?),
        "TIMESTAMP" => elements(get::<Vec<Option<NaiveDateTime>>>(row, index)?),
        "TIMESTAMPTZ" => elements(get::<Vec<Option<DateTime<Utc>>>>(row, index)?),
        "JSON" | "JSONB" => elements(get::<Vec<Option<serde_json::Value>>>(row, index)?),
        "UUID" => get::<Vec<Option<Uuid>>>(row, index)?
            .into_iter()
            .map(|v| Value::from(v.map(|u| u.to_string())))
            .collect(),
        _ => return None,
    };
    Some(Value::Array(items))
}

fn elements<T: Into<Value>>(items: Vec<Option<T>>) -> Vec<Value> {
    items.into_iter().map(Value::from).collect()
}

/// Recognizes the binary NUMERIC encodings of `NaN` and the infinities,
/// which have no `Decimal` or `BigDecimal` representation.
fn numeric_special(bytes: &[u8]) -> Option<&'static str> {
    // Header: ndigits, weight, sign, dscale; each a big-endian i16.
    let sign = u16::from_be_bytes([*bytes.get(4)?, *bytes.get(5)?]);
    match sign {
        0xC000 => Some("NaN"),
        0xD000 => Some("Infinity"),
        0xF000 => Some("-Infinity"),
        _ => None,
    }
}

/// Renders an interval the way PostgreSQL's default output style does.
fn format_interval(interval: &PgInterval) -> String {
    fn unit(n: i32, singular: &str, plural: &str) -> String {
        format!("{n} {}", if n.abs() == 1 { singular } else { plural })
    }

    let mut parts = Vec::new();
    let (years, months) = (interval.months / 12, interval.months % 12);
    if years != 0 {
        parts.push(unit(years, "year", "years"));
    }
    if months != 0 {
        parts.push(unit(months, "mon", "mons"));
    }
    if interval.days != 0 {
        parts.push(unit(interval.days, "day", "days"));
    }

    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            clock.push_str(format!(".{frac:06}").trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

/// Renders an address the way PostgreSQL does: `inet` host addresses drop
/// the full-length prefix, `cidr` always keeps it.
fn format_network(network: IpNetwork, is_inet: bool) -> String {
    let host_prefix = if network.is_ipv4() { 32 } else { 128 };
    if is_inet && network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, spec: &ConnectionSpec) -> WardenError {
    let host = &spec.host;
    let port = spec.effective_port();
    let user = &spec.username;
    let database = spec.primary_database();

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        WardenError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        WardenError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        WardenError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        WardenError::connection("Server requires a TLS connection, which was refused or failed.")
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        WardenError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        WardenError::connection(error.to_string())
    }
}

/// Formats a query error with detail and hint if the server sent them.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
