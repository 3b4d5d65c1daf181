//! Immutable query tree nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::builder::QueryBuilder;
use super::clause::WhereClause;
use super::error::{QueryError, QueryResult};

/// Declared row-count shape of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// Exactly one row.
    One,
    /// Zero or more rows, delivered as an array.
    #[default]
    Many,
    /// Zero or one row; zero rows yields `null`.
    Maybe,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::One => "one",
            Cardinality::Many => "many",
            Cardinality::Maybe => "maybe",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a node is rendered to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    /// The request/response shape, including `hash`.
    Wire,
    /// Identity form: no `hash`, parameters reduced to their id.
    Canonical,
}

/// A built query: a primary table query plus nested queries joined to it.
///
/// Nodes are only produced by the terminal calls of [`QueryBuilder`], which
/// validate the tree and compute [`hash`](QueryNode::hash). Fields are shared
/// with the builders they came from; a node is never mutated after it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    pub(crate) from: String,
    pub(crate) select: Arc<BTreeSet<String>>,
    pub(crate) filters: Arc<BTreeMap<String, WhereClause>>,
    pub(crate) include: Arc<BTreeMap<String, Arc<QueryNode>>>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) cardinality: Cardinality,
    pub(crate) lazy: bool,
    pub(crate) grouping_id: Arc<Vec<String>>,
    pub(crate) permissions: Arc<BTreeSet<String>>,
    pub(crate) name: String,
    pub(crate) hash: String,
}

impl QueryNode {
    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn select(&self) -> &BTreeSet<String> {
        &self.select
    }

    /// The `where` map.
    pub fn filters(&self) -> &BTreeMap<String, WhereClause> {
        &self.filters
    }

    pub fn include(&self) -> &BTreeMap<String, Arc<QueryNode>> {
        &self.include
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn grouping_id(&self) -> &[String] {
        &self.grouping_id
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content-derived identity, fixed when the node was built.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// True if this node or any descendant is deferred.
    pub fn has_deferred(&self) -> bool {
        self.lazy || self.include.values().any(|child| child.has_deferred())
    }

    /// Start a new builder from this node's fields.
    ///
    /// The builder shares this node's maps until one of them is changed. Nodes do
    /// not remember the schema they were checked against, so the builder has none;
    /// chain [`QueryBuilder::schema`] to check the rebuilt node again.
    pub fn to_builder(&self) -> QueryBuilder {
        QueryBuilder::from_node(self)
    }

    /// Substitute parameter values by id, throughout the tree.
    ///
    /// A parameter with no entry in `params` keeps its default value; one with
    /// neither is [`QueryError::MissingParameter`]. The identity hash is kept as is.
    pub fn bind_params(&self, params: &Map<String, Value>) -> QueryResult<QueryNode> {
        let mut filters = BTreeMap::new();
        for (column, clause) in self.filters.iter() {
            let bound = clause.map_params(|param| match params.get(&param.id) {
                Some(value) => Ok(value.clone()),
                None if !param.value.is_null() => Ok(param.value.clone()),
                None => Err(QueryError::MissingParameter(param.id.clone())),
            })?;
            filters.insert(column.clone(), bound);
        }

        let mut include = BTreeMap::new();
        for (key, child) in self.include.iter() {
            include.insert(key.clone(), Arc::new(child.bind_params(params)?));
        }

        Ok(QueryNode {
            filters: Arc::new(filters),
            include: Arc::new(include),
            ..self.clone()
        })
    }

    /// Render this node to JSON.
    pub fn to_value(&self) -> Value {
        self.encode(Encoding::Wire)
    }

    pub(crate) fn encode(&self, encoding: Encoding) -> Value {
        let mut obj = Map::new();
        obj.insert("from".to_string(), Value::String(self.from.clone()));

        let select = self
            .select
            .iter()
            .map(|column| (column.clone(), Value::Bool(true)))
            .collect();
        obj.insert("select".to_string(), Value::Object(select));

        let filters = self
            .filters
            .iter()
            .map(|(column, clause)| {
                let value = match encoding {
                    Encoding::Wire => clause.to_value(),
                    Encoding::Canonical => canonical_clause(clause),
                };
                (column.clone(), value)
            })
            .collect();
        obj.insert("where".to_string(), Value::Object(filters));

        let include = self
            .include
            .iter()
            .map(|(key, child)| (key.clone(), child.encode(encoding)))
            .collect();
        obj.insert("include".to_string(), Value::Object(include));

        if let Some(limit) = self.limit {
            obj.insert("limit".to_string(), Value::from(limit));
        }
        if let Some(offset) = self.offset {
            obj.insert("offset".to_string(), Value::from(offset));
        }
        obj.insert(
            "cardinality".to_string(),
            Value::String(self.cardinality.as_str().to_string()),
        );
        if self.lazy {
            obj.insert("lazy".to_string(), Value::Bool(true));
        }
        obj.insert(
            "groupingId".to_string(),
            Value::Array(self.grouping_id.iter().cloned().map(Value::String).collect()),
        );
        obj.insert(
            "permissions".to_string(),
            Value::Array(self.permissions.iter().cloned().map(Value::String).collect()),
        );
        obj.insert("name".to_string(), Value::String(self.name.clone()));
        if encoding == Encoding::Wire {
            obj.insert("hash".to_string(), Value::String(self.hash.clone()));
        }
        Value::Object(obj)
    }
}

/// Parameters are reduced to their id so that bound values do not affect identity.
fn canonical_clause(clause: &WhereClause) -> Value {
    use super::clause::Operand;

    match clause {
        WhereClause::Param(param) => Value::String(param.id.clone()),
        WhereClause::Op {
            op,
            operand: Operand::Param(param),
        } => {
            let mut obj = Map::new();
            obj.insert(op.symbol().to_string(), Value::String(param.id.clone()));
            Value::Object(obj)
        }
        other => other.to_value(),
    }
}

impl Serialize for QueryNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
