//! Normalized schema model.
//!
//! Every engine's metadata ends up in the same three structs, which are
//! serialized as plain JSON for persistence and prompt building by callers.

use serde::{Deserialize, Serialize};

/// Normalized description of a database's tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOverview {
    /// Primary database name.
    pub database: String,

    /// Discovered (or requested) schema names in first-seen order.
    pub schemas: Vec<String>,

    /// Tables in discovery order.
    pub tables: Vec<TableOverview>,
}

impl SchemaOverview {
    /// Returns the number of tables discovered.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Finds a table by schema and name.
    pub fn find_table(&self, schema: &str, name: &str) -> Option<&TableOverview> {
        self.tables
            .iter()
            .find(|table| table.schema == schema && table.name == name)
    }

    /// Formats the schema as a compact digest for an LLM system prompt.
    ///
    /// Tables are always written with their schema prefix so generated SQL
    /// can reference them unambiguously.
    pub fn format_for_llm(&self) -> String {
        let mut out = format!("Database: {}", self.database);
        if !self.schemas.is_empty() {
            out.push_str(&format!(" (schemas: {})", self.schemas.join(", ")));
        }
        out.push('\n');

        for table in &self.tables {
            out.push_str(&format!("- {}.{}", table.schema, table.name));
            if let Some(comment) = non_blank(&table.comment) {
                out.push_str(&format!(" -- {comment}"));
            }
            out.push('\n');
            for column in &table.columns {
                out.push_str(&format!("  - {}: {}", column.name, column.data_type));
                if !column.nullable {
                    out.push_str(" NOT NULL");
                }
                if let Some(comment) = non_blank(&column.comment) {
                    out.push_str(&format!(" -- {comment}"));
                }
                out.push('\n');
            }
        }
        out
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A table and its columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOverview {
    /// Schema the table lives in.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<ColumnOverview>,

    /// Table comment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TableOverview {
    /// Creates a table with no columns.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            comment: None,
        }
    }

    /// Sets the columns.
    pub fn with_columns(self, columns: Vec<ColumnOverview>) -> Self {
        Self { columns, ..self }
    }

    /// Sets the comment.
    pub fn with_comment(self, comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..self
        }
    }
}

/// A column of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOverview {
    /// Column name.
    pub name: String,

    /// Engine-native type name (e.g. "int", "character varying").
    #[serde(rename = "type")]
    pub data_type: String,

    /// Whether the column allows NULL values.
    pub nullable: bool,

    /// Column comment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnOverview {
    /// Creates a nullable column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            comment: None,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self { nullable, ..self }
    }

    /// Sets the comment.
    pub fn with_comment(self, comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..self
        }
    }
}

/// A table as reported by a metadata listing, before columns are fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableEntry {
    /// Schema label as reported by the engine; may be blank.
    pub schema: Option<String>,

    /// Table name.
    pub name: String,

    /// Table comment, if any.
    pub comment: Option<String>,
}

impl TableEntry {
    /// Creates an entry with the given schema label and name.
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(String::from),
            name: name.into(),
            comment: None,
        }
    }

    /// Sets the comment.
    pub fn with_comment(self, comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..self
        }
    }
}

/// Parses the `YES`/`NO` nullability flag used by `information_schema`.
pub fn parse_nullable(flag: &str) -> bool {
    flag.trim().eq_ignore_ascii_case("YES")
}
