//! In-memory engine over JSON rows.
//!
//! Data is a JSON object mapping table names to arrays of row objects:
//!
//! ```json
//! { "customer": [{ "customer_id": 4, "store_id": 1 }], "store": [{ "store_id": 1 }] }
//! ```
//!
//! Rows are scanned in file order. `where` clauses are evaluated by
//! [`predicate`](super::predicate); `$ref` clauses read the nearest enclosing
//! row of the referenced table. A node with an empty `select` returns every
//! column of its rows; nodes built against a schema always name their columns.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::deferred::{self, PendingBranch};
use super::predicate::{matches_all, Ancestor};
use super::{EngineError, EngineResult, ExecuteOptions, FrameStream, QueryEngine};
use crate::query::{Cardinality, QueryNode};

/// One table row.
pub type Row = Map<String, Value>;

/// Table data keyed by table name.
pub type Tables = BTreeMap<String, Vec<Row>>;

/// Errors loading table data.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Data file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read data file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse data file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Executes query trees against tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    tables: Arc<Tables>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table.
    pub fn with_table<I>(mut self, name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Row>,
    {
        Arc::make_mut(&mut self.tables).insert(name.into(), rows.into_iter().collect());
        self
    }

    pub fn from_value(value: Value) -> Result<Self, DataError> {
        let tables: Tables = serde_json::from_value(value)?;
        Ok(Self {
            tables: Arc::new(tables),
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self, DataError> {
        let tables: Tables = serde_json::from_str(s)?;
        Ok(Self {
            tables: Arc::new(tables),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::FileNotFound(path.to_path_buf()));
        }
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(Vec::as_slice)
    }
}

impl QueryEngine for MemoryEngine {
    fn execute(&self, query: Arc<QueryNode>, options: ExecuteOptions) -> FrameStream {
        log::debug!(
            "[{}] executing '{}' ({}) in memory",
            options.request_id,
            query.name(),
            query.hash()
        );
        deferred::frames(Arc::clone(&self.tables), query, options)
    }
}

/// Evaluates nodes against the tables, recording deferred branches it meets.
pub(crate) struct Resolver<'e> {
    tables: &'e Tables,
    defer: bool,
    pub(crate) pending: Vec<PendingBranch>,
}

impl<'e> Resolver<'e> {
    /// With `defer` off, lazy nodes are resolved inline.
    pub(crate) fn new(tables: &'e Tables, defer: bool) -> Self {
        Self {
            tables,
            defer,
            pending: Vec::new(),
        }
    }

    /// Resolve `node` to its result value, located at `pointer` in the frame.
    pub(crate) fn resolve<'a>(
        &mut self,
        node: &'a Arc<QueryNode>,
        ancestors: &[Ancestor<'a>],
        pointer: &str,
    ) -> EngineResult<Value>
    where
        'e: 'a,
    {
        let tables: &'e Tables = self.tables;
        let rows = tables
            .get(node.from())
            .ok_or_else(|| EngineError::UnknownTable(node.from().to_string()))?;

        let mut matched: Vec<&'e Row> = Vec::new();
        for row in rows {
            if matches_all(node, row, ancestors)? {
                matched.push(row);
            }
        }
        let offset = node.offset().unwrap_or(0) as usize;
        let mut window = matched.into_iter().skip(offset);

        match node.cardinality() {
            Cardinality::One => {
                let window: Vec<&Row> = window.collect();
                match window.as_slice() {
                    [row] => self.render(node, *row, ancestors, pointer),
                    _ => Err(EngineError::Cardinality {
                        name: node.name().to_string(),
                        expected: Cardinality::One,
                        found: window.len(),
                    }),
                }
            }
            Cardinality::Maybe => match window.next() {
                Some(row) => self.render(node, row, ancestors, pointer),
                None => Ok(Value::Null),
            },
            Cardinality::Many => {
                let limit = node.limit().map_or(usize::MAX, |n| n as usize);
                let mut out = Vec::new();
                for (i, row) in window.take(limit).enumerate() {
                    out.push(self.render(node, row, ancestors, &format!("{}/{}", pointer, i))?);
                }
                Ok(Value::Array(out))
            }
        }
    }

    fn render<'a>(
        &mut self,
        node: &'a Arc<QueryNode>,
        row: &'a Row,
        ancestors: &[Ancestor<'a>],
        pointer: &str,
    ) -> EngineResult<Value>
    where
        'e: 'a,
    {
        let mut out = project(node, row);
        if node.include().is_empty() {
            return Ok(Value::Object(out));
        }

        let mut scope: Vec<Ancestor<'a>> = ancestors.to_vec();
        scope.push((node.from(), row));

        for (key, child) in node.include() {
            let child_pointer = format!("{}/{}", pointer, escape_pointer(key));
            let value = if child.is_lazy() && self.defer {
                self.pending
                    .push(PendingBranch::new(child_pointer, Arc::clone(child), &scope));
                deferred::pending_marker(child)
            } else {
                self.resolve(child, &scope, &child_pointer)?
            };
            out.insert(key.clone(), value);
        }
        Ok(Value::Object(out))
    }
}

fn project(node: &QueryNode, row: &Row) -> Row {
    if node.select().is_empty() {
        return row.clone();
    }
    node.select()
        .iter()
        .map(|column| (column.clone(), row.get(column).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Escape a key for use as a JSON pointer segment.
fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
