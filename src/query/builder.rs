//! Composable, non-destructive query builder.
//!
//! Every non-terminal call returns a new builder; the receiver is left
//! untouched, and unchanged maps are shared between the two. Only the terminal
//! calls (`one`, `many`/`all`, `maybe`/`first`, `first_or_throw`, `take`) fix the
//! cardinality, validate the tree, and compute the identity hash.
//!
//! ```
//! use tributary::query::{QueryBuilder, RefOp, WhereClause};
//!
//! let store = QueryBuilder::new("store")
//!     .filter("store_id", RefOp::unchecked("customer", "store_id"))
//!     .one()
//!     .unwrap();
//! let customer = QueryBuilder::new("customer")
//!     .filter("customer_id", WhereClause::is_in([4]))
//!     .include("store", store)
//!     .one()
//!     .unwrap();
//! assert_eq!(customer.limit(), Some(1));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::clause::WhereClause;
use super::error::QueryResult;
use super::hash::hash_query;
use super::node::{Cardinality, QueryNode};
use super::validate::validate;
use crate::schema::{ReferenceError, Schema};

/// Accumulates the fields of a [`QueryNode`] until a terminal call builds it.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    schema: Option<Arc<Schema>>,
    from: String,
    select: Option<Arc<BTreeSet<String>>>,
    filters: Arc<BTreeMap<String, WhereClause>>,
    include: Arc<BTreeMap<String, Arc<QueryNode>>>,
    limit: Option<u64>,
    offset: Option<u64>,
    lazy: bool,
    grouping_id: Option<Arc<Vec<String>>>,
    permissions: Arc<BTreeSet<String>>,
    name: Option<String>,
}

impl QueryBuilder {
    /// A builder for `table` that is not checked against any schema.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            from: table.into(),
            select: None,
            filters: Arc::default(),
            include: Arc::default(),
            limit: None,
            offset: None,
            lazy: false,
            grouping_id: None,
            permissions: Arc::default(),
            name: None,
        }
    }

    /// A builder whose terminal calls check columns and references against `schema`.
    ///
    /// Prefer [`Schema::from_table`], which also rejects an unknown table up front.
    pub fn with_schema(schema: Arc<Schema>, table: impl Into<String>) -> Self {
        Self {
            schema: Some(schema),
            ..Self::new(table)
        }
    }

    pub(crate) fn from_node(node: &QueryNode) -> Self {
        Self {
            schema: None,
            from: node.from.clone(),
            select: Some(Arc::clone(&node.select)),
            filters: Arc::clone(&node.filters),
            include: Arc::clone(&node.include),
            limit: node.limit,
            offset: node.offset,
            lazy: node.lazy,
            grouping_id: Some(Arc::clone(&node.grouping_id)),
            permissions: Arc::clone(&node.permissions),
            name: Some(node.name.clone()),
        }
    }

    /// Check terminal calls against `schema` from here on.
    pub fn schema(&self, schema: Arc<Schema>) -> Self {
        Self {
            schema: Some(schema),
            ..self.clone()
        }
    }

    pub fn table(&self) -> &str {
        &self.from
    }

    /// Replace the selected columns.
    pub fn select<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            select: Some(Arc::new(columns.into_iter().map(Into::into).collect())),
            ..self.clone()
        }
    }

    /// Add (or replace) the `where` clause for `column`.
    #[doc(alias = "where")]
    pub fn filter(&self, column: impl Into<String>, clause: impl Into<WhereClause>) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.filters).insert(column.into(), clause.into());
        next
    }

    /// Add several `where` clauses at once.
    pub fn filters<I, S, C>(&self, clauses: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: Into<WhereClause>,
    {
        let mut next = self.clone();
        let filters = Arc::make_mut(&mut next.filters);
        for (column, clause) in clauses {
            filters.insert(column.into(), clause.into());
        }
        next
    }

    /// Nest `query` under `key`. Its join predicate is checked by the terminal call.
    pub fn include(&self, key: impl Into<String>, query: impl Into<Arc<QueryNode>>) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.include).insert(key.into(), query.into());
        next
    }

    /// Merge another include map into this one; entries in `other` win on key clashes.
    pub fn also_include<I, S>(&self, other: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<QueryNode>)>,
        S: Into<String>,
    {
        let mut next = self.clone();
        let include = Arc::make_mut(&mut next.include);
        for (key, query) in other {
            include.insert(key.into(), query);
        }
        next
    }

    pub fn limit(&self, limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..self.clone()
        }
    }

    pub fn offset(&self, offset: u64) -> Self {
        Self {
            offset: Some(offset),
            ..self.clone()
        }
    }

    /// Resolve this query after its parent, in a later frame.
    pub fn lazy(&self) -> Self {
        Self {
            lazy: true,
            ..self.clone()
        }
    }

    /// Alias of [`lazy`](Self::lazy).
    pub fn defer(&self) -> Self {
        self.lazy()
    }

    /// Columns identifying a row across streamed frames.
    #[doc(alias = "grouping_id")]
    pub fn group_by<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            grouping_id: Some(Arc::new(columns.into_iter().map(Into::into).collect())),
            ..self.clone()
        }
    }

    pub fn name(&self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self.clone()
        }
    }

    /// Replace the permission tags carried by the node.
    pub fn permissions<I, S>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: Arc::new(tags.into_iter().map(Into::into).collect()),
            ..self.clone()
        }
    }

    /// Exactly one row; limits to 1 unless a larger limit is set.
    pub fn one(&self) -> QueryResult<QueryNode> {
        self.build(Cardinality::One, at_least_one(self.limit))
    }

    /// Alias of [`one`](Self::one).
    pub fn first_or_throw(&self) -> QueryResult<QueryNode> {
        self.one()
    }

    /// Zero or one row; limits to 1 unless a larger limit is set.
    pub fn maybe(&self) -> QueryResult<QueryNode> {
        self.build(Cardinality::Maybe, at_least_one(self.limit))
    }

    /// Alias of [`maybe`](Self::maybe).
    pub fn first(&self) -> QueryResult<QueryNode> {
        self.maybe()
    }

    /// Zero or more rows; the limit is left as it is.
    pub fn many(&self) -> QueryResult<QueryNode> {
        self.build(Cardinality::Many, self.limit)
    }

    /// Alias of [`many`](Self::many).
    pub fn all(&self) -> QueryResult<QueryNode> {
        self.many()
    }

    /// Up to `n` rows.
    pub fn take(&self, n: u64) -> QueryResult<QueryNode> {
        self.build(Cardinality::Many, Some(n))
    }

    fn build(&self, cardinality: Cardinality, limit: Option<u64>) -> QueryResult<QueryNode> {
        let schema = self.schema.as_deref();

        // Against a schema an empty select means every selectable column, never the raw row
        let select = match (&self.select, schema) {
            (Some(select), Some(_)) if !select.is_empty() => Arc::clone(select),
            (_, Some(schema)) => {
                let columns: BTreeSet<String> =
                    schema.selectable_columns(&self.from)?.into_iter().collect();
                if columns.is_empty() {
                    return Err(ReferenceError::NothingSelectable(self.from.clone()).into());
                }
                Arc::new(columns)
            }
            (Some(select), None) => Arc::clone(select),
            (None, None) => Arc::default(),
        };

        let grouping_id = match (&self.grouping_id, schema) {
            (Some(grouping_id), _) => Arc::clone(grouping_id),
            (None, Some(schema)) => Arc::new(schema.primary_key(&self.from)?),
            (None, None) => Arc::default(),
        };

        let name = self
            .name
            .clone()
            .unwrap_or_else(|| default_name(&self.from, &self.filters));

        let mut node = QueryNode {
            from: self.from.clone(),
            select,
            filters: Arc::clone(&self.filters),
            include: Arc::clone(&self.include),
            limit,
            offset: self.offset,
            cardinality,
            lazy: self.lazy,
            grouping_id,
            permissions: Arc::clone(&self.permissions),
            name,
            hash: String::new(),
        };

        validate(&node, schema)?;
        node.hash = hash_query(&node);
        Ok(node)
    }
}

fn at_least_one(limit: Option<u64>) -> Option<u64> {
    match limit {
        Some(n) if n > 1 => Some(n),
        _ => Some(1),
    }
}

/// `from` followed by the sorted `where` keys, dash-separated.
fn default_name(from: &str, filters: &BTreeMap<String, WhereClause>) -> String {
    if filters.is_empty() {
        return from.to_string();
    }
    let keys: Vec<&str> = filters.keys().map(String::as_str).collect();
    format!("{}-{}", from, keys.join("-"))
}
