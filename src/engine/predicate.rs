//! Where-clause evaluation over JSON rows.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::memory::Row;
use super::{EngineError, EngineResult};
use crate::query::{Operand, Operator, QueryNode, RefOp, WhereClause};

static NULL: Value = Value::Null;

/// A row of an enclosing query, nearest last.
pub type Ancestor<'a> = (&'a str, &'a Row);

/// True if `row` satisfies every `where` clause of `node`.
pub fn matches_all(node: &QueryNode, row: &Row, ancestors: &[Ancestor<'_>]) -> EngineResult<bool> {
    for (column, clause) in node.filters() {
        let value = row.get(column).unwrap_or(&NULL);
        if !matches(node, value, clause, ancestors)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate one clause against a column value.
pub fn matches(
    node: &QueryNode,
    value: &Value,
    clause: &WhereClause,
    ancestors: &[Ancestor<'_>],
) -> EngineResult<bool> {
    Ok(match clause {
        WhereClause::Literal(expected) => values_equal(value, expected),
        WhereClause::Param(param) => values_equal(value, &param.value),
        WhereClause::Ref(reference) => {
            let target = resolve_ref(node, reference, ancestors)?;
            apply(reference.operator(), value, target)
        }
        WhereClause::Op { op, operand } => match operand {
            Operand::Value(rhs) => apply(*op, value, rhs),
            Operand::List(items) => apply_list(*op, value, items),
            Operand::Param(param) => match &param.value {
                Value::Array(items) => apply_list(*op, value, items),
                rhs => apply(*op, value, rhs),
            },
            Operand::Ref(reference) => {
                let target = resolve_ref(node, reference, ancestors)?;
                apply(*op, value, target)
            }
        },
    })
}

/// The value a reference points at: the column of the nearest enclosing row of its table.
pub fn resolve_ref<'a>(
    node: &QueryNode,
    reference: &RefOp,
    ancestors: &[Ancestor<'a>],
) -> EngineResult<&'a Value> {
    let row: &'a Row = ancestors
        .iter()
        .rev()
        .find(|(table, _)| *table == reference.table)
        .map(|(_, row)| *row)
        .ok_or_else(|| EngineError::UnresolvedReference {
            name: node.name().to_string(),
            table: reference.table.clone(),
            column: reference.column.clone(),
        })?;
    Ok(row.get(&reference.column).unwrap_or(&NULL))
}

fn apply(op: Operator, lhs: &Value, rhs: &Value) -> bool {
    match op {
        Operator::Eq => values_equal(lhs, rhs),
        Operator::Ne => !values_equal(lhs, rhs),
        Operator::Lt => compare(lhs, rhs) == Some(Ordering::Less),
        Operator::Le => matches!(compare(lhs, rhs), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => compare(lhs, rhs) == Some(Ordering::Greater),
        Operator::Ge => matches!(
            compare(lhs, rhs),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::In | Operator::NotIn => match rhs {
            Value::Array(items) => apply_list(op, lhs, items),
            single => apply_list(op, lhs, std::slice::from_ref(single)),
        },
        Operator::Like => like(lhs, rhs, false),
        Operator::ILike => like(lhs, rhs, true),
    }
}

fn apply_list(op: Operator, lhs: &Value, items: &[Value]) -> bool {
    let found = items.iter().any(|item| values_equal(lhs, item));
    match op {
        Operator::In => found,
        Operator::NotIn => !found,
        // A list operand for a scalar operator compares against each element
        other => items.iter().any(|item| apply(other, lhs, item)),
    }
}

/// JSON equality, with numbers compared by value (`4 == 4.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Order numbers with numbers and strings with strings; anything else is incomparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like(value: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Value::String(value), Value::String(pattern)) = (value, pattern) else {
        return false;
    };
    match like_regex(pattern, case_insensitive) {
        Ok(re) => re.is_match(value),
        Err(e) => {
            log::warn!("Unusable LIKE pattern '{}': {}", pattern, e);
            false
        }
    }
}

/// Translate a SQL `LIKE` pattern into an anchored regex.
///
/// `%` matches any run of characters and `_` exactly one; everything else is literal.
pub fn like_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?s)^");
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .build()
}

/// Case-sensitive SQL `LIKE`.
pub fn like_match(value: &str, pattern: &str) -> bool {
    like_regex(pattern, false).is_ok_and(|re| re.is_match(value))
}
