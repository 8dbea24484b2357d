//! Engine dialects and scan-target resolution.
//!
//! Each supported engine addresses its metadata differently. MySQL and
//! MariaDB have no schema level below the database, so every database is a
//! catalog of its own. PostgreSQL nests enumerable schemas under a single
//! catalog (the connected database). This module turns the operator's
//! comma-separated database field into the list of [`ScanTarget`]s the
//! harvester walks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema label used for the PostgreSQL wildcard target.
pub const POSTGRES_DEFAULT_SCHEMA: &str = "public";

/// Column query joining `information_schema` with `pg_description` so that
/// column comments come back alongside type and nullability.
const POSTGRES_ENRICHED_COLUMNS: &str = r#"
    SELECT
        c.column_name::text,
        c.data_type::text,
        c.is_nullable::text,
        pgd.description::text
    FROM information_schema.columns c
    JOIN pg_catalog.pg_class cls ON cls.relname = c.table_name
    JOIN pg_catalog.pg_namespace nsp
        ON nsp.oid = cls.relnamespace AND nsp.nspname = c.table_schema
    LEFT JOIN pg_catalog.pg_description pgd
        ON pgd.objoid = cls.oid AND pgd.objsubid = c.ordinal_position
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    MySql,
    MariaDb,
    #[serde(alias = "postgres")]
    PostgreSql,
}

impl Engine {
    /// Returns the engine name used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::PostgreSql => "postgresql",
        }
    }

    /// Parses an engine from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Some(Self::MySql),
            "mariadb" => Some(Self::MariaDb),
            "postgres" | "postgresql" => Some(Self::PostgreSql),
            _ => None,
        }
    }

    /// Returns the default port for this engine.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql | Self::MariaDb => 3306,
            Self::PostgreSql => 5432,
        }
    }

    /// Builds the scan targets for the given raw database field.
    pub fn scan_targets(&self, raw: &str) -> Vec<ScanTarget> {
        let tokens = split_tokens(raw);
        let Some((primary, explicit)) = tokens.split_first() else {
            return Vec::new();
        };

        if explicit.is_empty() {
            return vec![match self {
                Self::MySql | Self::MariaDb => ScanTarget::catalog(*primary),
                Self::PostgreSql => ScanTarget::all_schemas(*primary),
            }];
        }

        let mut targets: Vec<ScanTarget> = Vec::with_capacity(explicit.len());
        for token in explicit {
            let target = match self {
                Self::MySql | Self::MariaDb => ScanTarget::catalog(*token),
                Self::PostgreSql => ScanTarget::schema(*primary, *token),
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    /// Returns the engine-specific column query carrying comments, if any.
    ///
    /// The query binds the schema name first and the table name second and
    /// yields `(name, type, is_nullable, comment)` rows.
    pub fn enriched_column_query(&self) -> Option<&'static str> {
        match self {
            Self::PostgreSql => Some(POSTGRES_ENRICHED_COLUMNS),
            Self::MySql | Self::MariaDb => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved addressing unit to enumerate during harvesting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTarget {
    /// Catalog to list tables under.
    pub catalog: String,

    /// Schema to restrict the listing to; `None` means the catalog itself
    /// (MySQL/MariaDB) or every schema (PostgreSQL wildcard).
    pub schema_pattern: Option<String>,

    /// True when the target enumerates all schemas of the catalog.
    pub wildcard: bool,
}

impl ScanTarget {
    /// A catalog-only target (MySQL/MariaDB).
    pub fn catalog(catalog: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema_pattern: None,
            wildcard: false,
        }
    }

    /// A single explicit schema under a catalog (PostgreSQL).
    pub fn schema(catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema_pattern: Some(schema.into()),
            wildcard: false,
        }
    }

    /// Every schema of the catalog (PostgreSQL).
    pub fn all_schemas(catalog: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema_pattern: None,
            wildcard: true,
        }
    }

    /// The schema label tables found through this target fall back to.
    pub fn label(&self) -> &str {
        match (&self.schema_pattern, self.wildcard) {
            (Some(schema), _) => schema,
            (None, true) => POSTGRES_DEFAULT_SCHEMA,
            (None, false) => &self.catalog,
        }
    }
}

/// Resolves the scan targets for an engine and raw database field.
pub fn resolve_scan_targets(engine: Engine, raw: &str) -> Vec<ScanTarget> {
    engine.scan_targets(raw)
}

/// Returns the primary database name (the first non-empty token).
pub fn primary_database(raw: &str) -> &str {
    split_tokens(raw).first().copied().unwrap_or("")
}

/// Splits the database field on commas, trimming and dropping empty tokens.
pub fn split_tokens(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}
