//! Join references: "this column equals column X of table Y".
//!
//! On the wire a reference is written as
//!
//! ```json
//! { "$ref": { "table": "customer", "column": "store_id" } }
//! ```
//!
//! with an optional `"op"` (defaulting to `=`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::clause::Operator;
use crate::schema::{ReferenceError, Schema};

/// Key under which a reference is encoded.
pub const REF_KEY: &str = "$ref";

/// A reference to a column of another table in the query tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefOp {
    pub table: String,
    pub column: String,
    /// Comparison operator; `None` means equality.
    pub op: Option<Operator>,
}

impl RefOp {
    /// Build a reference without consulting a schema.
    pub fn unchecked(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            op: None,
        }
    }

    /// Parse a `table.column` path without consulting a schema.
    pub fn parse_path(path: &str) -> Result<Self, ReferenceError> {
        match path.split_once('.') {
            Some((table, column))
                if !table.is_empty() && !column.is_empty() && !column.contains('.') =>
            {
                Ok(Self::unchecked(table, column))
            }
            _ => Err(ReferenceError::InvalidPath(path.to_string())),
        }
    }

    pub fn with_op(mut self, op: Operator) -> Self {
        self.op = Some(op);
        self
    }

    /// The effective comparison operator.
    pub fn operator(&self) -> Operator {
        self.op.unwrap_or(Operator::Eq)
    }

    pub fn to_value(&self) -> Value {
        let mut inner = Map::new();
        inner.insert("table".to_string(), Value::String(self.table.clone()));
        inner.insert("column".to_string(), Value::String(self.column.clone()));
        if let Some(op) = self.op {
            inner.insert("op".to_string(), Value::String(op.symbol().to_string()));
        }
        let mut outer = Map::new();
        outer.insert(REF_KEY.to_string(), Value::Object(inner));
        Value::Object(outer)
    }

    /// Decode a reference; `None` unless `value` is exactly the reference shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        let outer = value.as_object()?;
        if outer.len() != 1 {
            return None;
        }
        let inner = outer.get(REF_KEY)?.as_object()?;
        let table = inner.get("table")?.as_str()?;
        let column = inner.get("column")?.as_str()?;
        let op = match inner.get("op") {
            None | Some(Value::Null) => None,
            Some(op) => Some(Operator::from_symbol(op.as_str()?)?),
        };
        Some(Self {
            table: table.to_string(),
            column: column.to_string(),
            op,
        })
    }
}

/// Build a reference to `table.column`, checking it against the schema.
pub fn reference(schema: &Schema, table: &str, column: &str) -> Result<RefOp, ReferenceError> {
    schema.check_includable(table, column)?;
    Ok(RefOp::unchecked(table, column))
}

/// Like [`reference`], from a `table.column` path.
pub fn reference_path(schema: &Schema, path: &str) -> Result<RefOp, ReferenceError> {
    let parsed = RefOp::parse_path(path)?;
    reference(schema, &parsed.table, &parsed.column)
}

/// True only for values that fully match the reference shape.
pub fn is_ref_op(value: &Value) -> bool {
    RefOp::from_value(value).is_some()
}

impl Serialize for RefOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RefOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RefOp::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("expected {\"$ref\": {\"table\", \"column\"}}"))
    }
}
