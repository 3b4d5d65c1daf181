//! Where clauses.
//!
//! A where clause is one of four shapes on the wire:
//!
//! ```text
//! 4                                               literal (implicit equality)
//! { "in": [4, 5] }                                operator applied to an operand
//! { "$ref": { "table": "customer", ... } }        join reference
//! { "type": "param-marker", "id": "x", "value": 4 }   parameter placeholder
//! ```
//!
//! Decoding is variant-aware: a `$ref` or `param-marker` object that is missing
//! required fields is an error, never silently read as a literal. Neither may
//! appear inside a list operand; a list parameter is one marker holding the list.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::reference::{RefOp, REF_KEY};

/// `type` tag of a parameter placeholder.
pub const PARAM_MARKER: &str = "param-marker";

/// Comparison operators usable in where clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Like,
    ILike,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Like => "like",
            Operator::ILike => "ilike",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        let op = match s {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "like" => Operator::Like,
            "ilike" => Operator::ILike,
            _ => return None,
        };
        Some(op)
    }

    /// `in` / `not in` take a list operand.
    pub fn is_set_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Operator::from_symbol(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown operator '{}'", s)))
    }
}

/// A placeholder whose value is bound at execution time.
///
/// Only `id` takes part in query identity; `value` is a default or bound payload.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub id: String,
    pub value: Value,
}

impl QueryParam {
    pub fn new(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }

    /// A placeholder with no default value.
    pub fn unbound(id: impl Into<String>) -> Self {
        Self::new(id, Value::Null)
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String(PARAM_MARKER.to_string()));
        obj.insert("id".to_string(), Value::String(self.id.clone()));
        obj.insert("value".to_string(), self.value.clone());
        Value::Object(obj)
    }

    /// `None` unless `value` carries the `param-marker` tag and a string id.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("type")?.as_str()? != PARAM_MARKER {
            return None;
        }
        let id = obj.get("id")?.as_str()?;
        Some(Self {
            id: id.to_string(),
            value: obj.get("value").cloned().unwrap_or(Value::Null),
        })
    }
}

fn is_tagged_param(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(Value::as_str)
        == Some(PARAM_MARKER)
}

fn is_tagged_ref(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key(REF_KEY))
}

/// Right-hand side of an operator clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
    Ref(RefOp),
    Param(QueryParam),
}

impl Operand {
    pub fn to_value(&self) -> Value {
        match self {
            Operand::Value(v) => v.clone(),
            Operand::List(items) => Value::Array(items.clone()),
            Operand::Ref(r) => r.to_value(),
            Operand::Param(p) => p.to_value(),
        }
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        if is_tagged_param(value) {
            return QueryParam::from_value(value)
                .map(Operand::Param)
                .ok_or_else(|| "param-marker without a string id".to_string());
        }
        if is_tagged_ref(value) {
            return RefOp::from_value(value)
                .map(Operand::Ref)
                .ok_or_else(|| "$ref requires string table and column".to_string());
        }
        let operand = match value {
            Value::Array(items) => Operand::List(items.clone()),
            other => Operand::Value(other.clone()),
        };
        match operand.nested_marker() {
            Some(reason) => Err(reason.to_string()),
            None => Ok(operand),
        }
    }

    /// Why a list operand is unusable: a marker inside a list is never bound or resolved.
    pub(crate) fn nested_marker(&self) -> Option<&'static str> {
        let Operand::List(items) = self else {
            return None;
        };
        if items.iter().any(is_tagged_param) {
            Some("param-marker inside a list; pass the whole list as one parameter")
        } else if items.iter().any(is_tagged_ref) {
            Some("$ref inside a list is not supported")
        } else {
            None
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Operand::List(items),
            other => Operand::Value(other),
        }
    }
}

impl From<Vec<Value>> for Operand {
    fn from(items: Vec<Value>) -> Self {
        Operand::List(items)
    }
}

impl From<RefOp> for Operand {
    fn from(r: RefOp) -> Self {
        Operand::Ref(r)
    }
}

impl From<QueryParam> for Operand {
    fn from(p: QueryParam) -> Self {
        Operand::Param(p)
    }
}

/// One entry of a node's `where` map.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// Implicit equality with a literal.
    Literal(Value),
    /// `{ op: operand }`
    Op { op: Operator, operand: Operand },
    Ref(RefOp),
    Param(QueryParam),
}

impl WhereClause {
    pub fn value(value: impl Into<Value>) -> Self {
        WhereClause::Literal(value.into())
    }

    pub fn op(op: Operator, operand: impl Into<Operand>) -> Self {
        WhereClause::Op {
            op,
            operand: operand.into(),
        }
    }

    /// `{ "in": [...] }`
    pub fn is_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        WhereClause::op(
            Operator::In,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// The join reference carried by this clause, directly or as an operand.
    pub fn join_ref(&self) -> Option<&RefOp> {
        match self {
            WhereClause::Ref(r) => Some(r),
            WhereClause::Op {
                operand: Operand::Ref(r),
                ..
            } => Some(r),
            _ => None,
        }
    }

    /// Every reference in this clause.
    pub fn refs(&self) -> impl Iterator<Item = &RefOp> {
        self.join_ref().into_iter()
    }

    /// Every parameter placeholder in this clause.
    pub fn params(&self) -> impl Iterator<Item = &QueryParam> {
        let param = match self {
            WhereClause::Param(p) => Some(p),
            WhereClause::Op {
                operand: Operand::Param(p),
                ..
            } => Some(p),
            _ => None,
        };
        param.into_iter()
    }

    /// Replace parameter values using `bind`; other variants are returned as-is.
    pub(crate) fn map_params<E>(
        &self,
        mut bind: impl FnMut(&QueryParam) -> Result<Value, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            WhereClause::Param(p) => WhereClause::Param(QueryParam::new(p.id.clone(), bind(p)?)),
            WhereClause::Op {
                op,
                operand: Operand::Param(p),
            } => WhereClause::Op {
                op: *op,
                operand: Operand::Param(QueryParam::new(p.id.clone(), bind(p)?)),
            },
            other => other.clone(),
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            WhereClause::Literal(v) => v.clone(),
            WhereClause::Op { op, operand } => {
                let mut obj = Map::new();
                obj.insert(op.symbol().to_string(), operand.to_value());
                Value::Object(obj)
            }
            WhereClause::Ref(r) => r.to_value(),
            WhereClause::Param(p) => p.to_value(),
        }
    }

    /// Decode a clause from its wire form.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        if is_tagged_param(value) {
            return QueryParam::from_value(value)
                .map(WhereClause::Param)
                .ok_or_else(|| "param-marker without a string id".to_string());
        }
        if is_tagged_ref(value) {
            return RefOp::from_value(value)
                .map(WhereClause::Ref)
                .ok_or_else(|| "$ref requires string table and column".to_string());
        }
        if let Some(obj) = value.as_object() {
            if obj.len() == 1 {
                if let Some((symbol, operand)) = obj.iter().next() {
                    if let Some(op) = Operator::from_symbol(symbol) {
                        let operand = Operand::from_value(operand)?;
                        return Ok(WhereClause::Op { op, operand });
                    }
                }
            }
        }
        Ok(WhereClause::Literal(value.clone()))
    }
}

impl From<Value> for WhereClause {
    fn from(value: Value) -> Self {
        WhereClause::Literal(value)
    }
}

impl From<RefOp> for WhereClause {
    fn from(r: RefOp) -> Self {
        WhereClause::Ref(r)
    }
}

impl From<QueryParam> for WhereClause {
    fn from(p: QueryParam) -> Self {
        WhereClause::Param(p)
    }
}

impl Serialize for WhereClause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WhereClause {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        WhereClause::from_value(&value).map_err(serde::de::Error::custom)
    }
}
