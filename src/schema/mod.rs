//! Read-only access to the table/column catalog.
//!
//! The catalog is a static description of each table's columns and the flags
//! that govern how queries may use them:
//!
//! ```json
//! {
//!   "tables": {
//!     "customer": {
//!       "columns": {
//!         "customer_id": { "type": "integer", "primary_key": true },
//!         "store_id":    { "type": "integer" },
//!         "password":    { "type": "text", "selectable": false }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! The same structure can be written as TOML (`[tables.customer.columns.store_id]`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::query::QueryBuilder;

/// A table or column reference that the catalog cannot satisfy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("column '{table}.{column}' is not selectable")]
    NotSelectable { table: String, column: String },

    #[error("column '{table}.{column}' cannot be used in a where clause")]
    NotWhereable { table: String, column: String },

    #[error("column '{table}.{column}' cannot be the target of a join reference")]
    NotIncludable { table: String, column: String },

    #[error("table '{0}' has no selectable columns")]
    NothingSelectable(String),

    #[error("invalid reference path '{0}', expected 'table.column'")]
    InvalidPath(String),
}

/// Errors loading a catalog file.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read schema file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse JSON schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse TOML schema: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unsupported schema format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// The whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: BTreeMap<String, TableSchema>,
}

/// Columns of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnSchema>,
}

/// Per-column metadata and usage flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Database type name, informational only.
    #[serde(rename = "type", default)]
    pub data_type: String,

    #[serde(default)]
    pub nullable: bool,

    /// May appear in `select`.
    #[serde(default = "default_true")]
    pub selectable: bool,

    /// May appear as a `where` key.
    #[serde(default = "default_true")]
    pub whereable: bool,

    /// May be the target of a `$ref` join predicate.
    #[serde(default = "default_true")]
    pub includable: bool,

    #[serde(default)]
    pub primary_key: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            data_type: String::new(),
            nullable: false,
            selectable: true,
            whereable: true,
            includable: true,
            primary_key: false,
        }
    }
}

impl ColumnSchema {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            ..Self::default()
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.selectable = false;
        self
    }

    pub fn not_whereable(mut self) -> Self {
        self.whereable = false;
        self
    }

    pub fn not_includable(mut self) -> Self {
        self.includable = false;
        self
    }
}

impl Schema {
    /// Load a catalog from a `.json` or `.toml` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SchemaError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(SchemaError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, SchemaError> {
        Ok(toml::from_str(s)?)
    }

    /// Add or replace a table (used to assemble catalogs in code).
    pub fn with_table<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnSchema)>,
        S: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(name, column)| (name.into(), column))
            .collect();
        self.tables.insert(name.into(), TableSchema { columns });
        self
    }

    /// Start a schema-checked query on `table`.
    pub fn from_table(self: &Arc<Self>, table: &str) -> Result<QueryBuilder, ReferenceError> {
        self.table(table)?;
        Ok(QueryBuilder::with_schema(Arc::clone(self), table))
    }

    /// Table names in sorted order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn table(&self, table: &str) -> Result<&TableSchema, ReferenceError> {
        self.tables
            .get(table)
            .ok_or_else(|| ReferenceError::UnknownTable(table.to_string()))
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Column names of `table` in sorted order.
    pub fn columns(&self, table: &str) -> Result<impl Iterator<Item = &str>, ReferenceError> {
        Ok(self.table(table)?.columns.keys().map(String::as_str))
    }

    pub fn column(&self, table: &str, column: &str) -> Result<&ColumnSchema, ReferenceError> {
        self.table(table)?
            .columns
            .get(column)
            .ok_or_else(|| ReferenceError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    pub fn is_selectable(&self, table: &str, column: &str) -> bool {
        self.column(table, column).is_ok_and(|c| c.selectable)
    }

    pub fn is_whereable(&self, table: &str, column: &str) -> bool {
        self.column(table, column).is_ok_and(|c| c.whereable)
    }

    pub fn is_includable(&self, table: &str, column: &str) -> bool {
        self.column(table, column).is_ok_and(|c| c.includable)
    }

    pub fn is_primary_key(&self, table: &str, column: &str) -> bool {
        self.column(table, column).is_ok_and(|c| c.primary_key)
    }

    /// Primary-key columns of `table`, in column-name order.
    pub fn primary_key(&self, table: &str) -> Result<Vec<String>, ReferenceError> {
        Ok(self
            .table(table)?
            .columns
            .iter()
            .filter(|(_, c)| c.primary_key)
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// Every column of `table` that may appear in `select`.
    pub fn selectable_columns(&self, table: &str) -> Result<Vec<String>, ReferenceError> {
        Ok(self
            .table(table)?
            .columns
            .iter()
            .filter(|(_, c)| c.selectable)
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// Check that `table.column` exists and is selectable.
    pub fn check_selectable(&self, table: &str, column: &str) -> Result<(), ReferenceError> {
        if self.column(table, column)?.selectable {
            Ok(())
        } else {
            Err(ReferenceError::NotSelectable {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }

    /// Check that `table.column` exists and is whereable.
    pub fn check_whereable(&self, table: &str, column: &str) -> Result<(), ReferenceError> {
        if self.column(table, column)?.whereable {
            Ok(())
        } else {
            Err(ReferenceError::NotWhereable {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }

    /// Check that `table.column` exists and may be referenced by a join predicate.
    pub fn check_includable(&self, table: &str, column: &str) -> Result<(), ReferenceError> {
        if self.column(table, column)?.includable {
            Ok(())
        } else {
            Err(ReferenceError::NotIncludable {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }
}
