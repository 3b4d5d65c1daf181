//! Structural validation of query nodes.
//!
//! Join safety is always enforced: every nested query must carry at least one
//! `$ref` where clause, directly or as an operator operand. When a schema is
//! available the node's `select` and `where` keys and its `$ref` targets are
//! checked against it as well.

use super::clause::WhereClause;
use super::error::{QueryError, QueryResult};
use super::node::QueryNode;
use crate::schema::Schema;

/// True if `query` is correlated to its parent by a `$ref` clause.
pub fn has_join_predicate(query: &QueryNode) -> bool {
    query.filters().values().any(|clause| clause.join_ref().is_some())
}

/// Check join safety of the node's direct includes.
pub fn check_join_safety(node: &QueryNode) -> QueryResult<()> {
    match join_safety_problems(node).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn join_safety_problems(node: &QueryNode) -> Vec<QueryError> {
    node.include()
        .iter()
        .filter(|(_, child)| !has_join_predicate(child))
        .map(|(key, child)| QueryError::NestedQueryMissingJoinPredicate {
            parent: Box::new(node.clone()),
            key: key.clone(),
            child: child.clone(),
        })
        .collect()
}

/// Every problem with `node` itself (nested queries are not descended into).
pub fn problems(node: &QueryNode, schema: Option<&Schema>) -> Vec<QueryError> {
    let mut errors = join_safety_problems(node);

    for (column, clause) in node.filters() {
        if let WhereClause::Op { operand, .. } = clause {
            if let Some(reason) = operand.nested_marker() {
                errors.push(QueryError::MalformedClause {
                    column: column.clone(),
                    reason: reason.to_string(),
                });
            }
        }
    }

    let Some(schema) = schema else {
        return errors;
    };

    if let Err(e) = schema.table(node.from()) {
        errors.push(e.into());
        return errors;
    }

    for column in node.select() {
        if let Err(e) = schema.check_selectable(node.from(), column) {
            errors.push(e.into());
        }
    }

    for (column, clause) in node.filters() {
        if let Err(e) = schema.check_whereable(node.from(), column) {
            errors.push(e.into());
        }
        for reference in clause.refs() {
            if let Err(e) = schema.check_includable(&reference.table, &reference.column) {
                errors.push(e.into());
            }
        }
    }

    errors
}

/// Every problem anywhere in the tree rooted at `node`, parents before children.
pub fn problems_in_tree(node: &QueryNode, schema: Option<&Schema>) -> Vec<QueryError> {
    let mut errors = problems(node, schema);
    for child in node.include().values() {
        errors.extend(problems_in_tree(child, schema));
    }
    errors
}

/// Fail with the first problem found in `node`.
pub fn validate(node: &QueryNode, schema: Option<&Schema>) -> QueryResult<()> {
    match problems(node, schema).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
