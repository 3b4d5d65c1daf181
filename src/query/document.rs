//! Request documents.
//!
//! A request body is either a literal query tree, in the same shape that
//! [`QueryNode`] serializes to, or a reference to a registered query:
//!
//! ```json
//! { "type": "registered-query", "queryId": "2711533450", "params": { "id": 4 } }
//! ```
//!
//! Literal trees are rebuilt through [`QueryBuilder`], so they are validated and
//! hashed exactly like trees composed in code. A `hash` sent by the client is
//! ignored.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::builder::QueryBuilder;
use super::clause::WhereClause;
use super::error::{QueryError, QueryResult};
use super::node::{Cardinality, QueryNode};
use crate::registry::QueryRegistry;
use crate::schema::Schema;

/// `type` tag of a registered-query request.
pub const REGISTERED_QUERY: &str = "registered-query";

/// `select` as either `{ "col": true }` or `["col"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SelectSpec {
    Map(BTreeMap<String, bool>),
    List(Vec<String>),
}

impl SelectSpec {
    fn columns(&self) -> Vec<String> {
        match self {
            SelectSpec::Map(map) => map
                .iter()
                .filter(|(_, selected)| **selected)
                .map(|(column, _)| column.clone())
                .collect(),
            SelectSpec::List(columns) => columns.clone(),
        }
    }
}

/// Wire form of a query tree, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct QueryDocument {
    pub from: String,
    #[serde(default)]
    pub select: Option<SelectSpec>,
    /// Raw clauses; decoded per column so errors can name the column.
    #[serde(rename = "where", default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub include: BTreeMap<String, QueryDocument>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub cardinality: Option<Cardinality>,
    #[serde(default)]
    pub lazy: bool,
    #[serde(default)]
    pub grouping_id: Option<Vec<String>>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl QueryDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Build and validate the tree, bottom-up.
    pub fn into_query(&self, schema: Option<&Arc<Schema>>) -> QueryResult<QueryNode> {
        let mut builder = match schema {
            Some(schema) => schema.from_table(&self.from)?,
            None => QueryBuilder::new(&self.from),
        };

        if let Some(select) = &self.select {
            builder = builder.select(select.columns());
        }
        for (column, raw) in &self.filters {
            let clause =
                WhereClause::from_value(raw).map_err(|reason| QueryError::MalformedClause {
                    column: column.clone(),
                    reason,
                })?;
            builder = builder.filter(column.clone(), clause);
        }
        for (key, child) in &self.include {
            builder = builder.include(key.clone(), child.into_query(schema)?);
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        if self.lazy {
            builder = builder.lazy();
        }
        if let Some(grouping_id) = &self.grouping_id {
            builder = builder.group_by(grouping_id.iter().cloned());
        }
        if let Some(permissions) = &self.permissions {
            builder = builder.permissions(permissions.iter().cloned());
        }
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }

        match self.cardinality.unwrap_or_default() {
            Cardinality::One => builder.one(),
            Cardinality::Maybe => builder.maybe(),
            Cardinality::Many => builder.many(),
        }
    }
}

/// An inbound request: a literal tree or a registered query with parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
    Query(QueryDocument),
    Registered {
        query_id: String,
        params: Map<String, Value>,
    },
}

impl QueryRequest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Turn the request into an executable tree.
    pub fn resolve(
        &self,
        schema: Option<&Arc<Schema>>,
        registry: &QueryRegistry,
    ) -> QueryResult<Arc<QueryNode>> {
        match self {
            QueryRequest::Query(document) => Ok(Arc::new(document.into_query(schema)?)),
            QueryRequest::Registered { query_id, params } => {
                Ok(Arc::new(registry.bind(query_id, params)?))
            }
        }
    }
}

impl<'de> Deserialize<'de> for QueryRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let value = Value::deserialize(deserializer)?;
        let tagged = value.get("type").and_then(Value::as_str) == Some(REGISTERED_QUERY);
        if !tagged {
            return QueryDocument::deserialize(value)
                .map(QueryRequest::Query)
                .map_err(D::Error::custom);
        }

        let query_id = value
            .get("queryId")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("queryId"))?;
        let params = match value.get("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params.clone(),
            Some(_) => return Err(D::Error::custom("params must be an object")),
        };
        Ok(QueryRequest::Registered {
            query_id: query_id.to_string(),
            params,
        })
    }
}
