//! Schema harvesting.
//!
//! Walks the resolved scan targets over a [`MetadataSource`] and builds the
//! normalized [`SchemaOverview`].

use super::dialect::{Engine, ScanTarget};
use super::schema::{ColumnOverview, SchemaOverview, TableOverview};
use super::MetadataSource;
use crate::error::Result;
use tracing::debug;

/// Harvests tables and columns for every scan target.
///
/// Blank schema labels reported per table are replaced by the scan target's
/// label. The returned `schemas` list is never empty: when nothing was
/// discovered it falls back to the requested target labels, and to the
/// database name when there were no targets at all.
pub async fn harvest<S>(
    engine: Engine,
    database: &str,
    targets: &[ScanTarget],
    source: &S,
) -> Result<SchemaOverview>
where
    S: MetadataSource + ?Sized,
{
    let mut discovered: Vec<String> = Vec::new();
    let mut tables = Vec::new();

    for target in targets {
        debug!(
            catalog = %target.catalog,
            schema = ?target.schema_pattern,
            wildcard = target.wildcard,
            "Listing tables"
        );
        let entries = source
            .list_tables(&target.catalog, target.schema_pattern.as_deref())
            .await?;

        for entry in entries {
            let schema = match entry.schema.as_deref().map(str::trim) {
                Some(label) if !label.is_empty() => label.to_string(),
                _ => target.label().to_string(),
            };
            push_unique(&mut discovered, &schema);

            let columns =
                fetch_columns(engine, source, &target.catalog, &schema, &entry.name).await?;
            tables.push(TableOverview {
                schema,
                name: entry.name,
                columns,
                comment: entry.comment,
            });
        }
    }

    let schemas = if discovered.is_empty() {
        let mut requested = Vec::new();
        for target in targets {
            push_unique(&mut requested, target.label());
        }
        if requested.is_empty() {
            requested.push(database.to_string());
        }
        requested
    } else {
        discovered
    };

    debug!(tables = tables.len(), schemas = ?schemas, "Harvest complete");

    Ok(SchemaOverview {
        database: database.to_string(),
        schemas,
        tables,
    })
}

/// Fetches columns, preferring the engine's enriched query.
///
/// Many deployments lack permission for the catalog tables the enriched
/// query reads, so an empty result or an error falls back to the generic
/// column listing.
async fn fetch_columns<S>(
    engine: Engine,
    source: &S,
    catalog: &str,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnOverview>>
where
    S: MetadataSource + ?Sized,
{
    if let Some(sql) = engine.enriched_column_query() {
        match source.query_columns(sql, schema, table).await {
            Ok(columns) if !columns.is_empty() => return Ok(columns),
            Ok(_) => debug!(schema, table, "Enriched column query returned no rows"),
            Err(e) => debug!(schema, table, error = %e, "Enriched column query failed"),
        }
    }

    source.list_columns(catalog, schema, table).await
}

fn push_unique(set: &mut Vec<String>, value: &str) {
    if !set.iter().any(|existing| existing == value) {
        set.push(value.to_string());
    }
}
