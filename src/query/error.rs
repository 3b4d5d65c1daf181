//! Errors raised while composing, validating, and binding query trees.

use std::sync::Arc;

use super::node::QueryNode;
use crate::error::ErrorKind;
use crate::schema::ReferenceError;

/// Result type for query composition.
pub type QueryResult<T> = Result<T, QueryError>;

/// A query tree that cannot be built or bound.
///
/// All of these are detected before any row is read or any byte is written.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// A nested query has no `$ref` where clause correlating it to its parent.
    #[error(
        "nested query '{key}' ({child_table}) included by '{parent_name}' has no join predicate; \
         add a $ref where clause referencing '{parent_table}'",
        child_table = child.from(),
        parent_name = parent.name(),
        parent_table = parent.from(),
    )]
    NestedQueryMissingJoinPredicate {
        /// The node that tried to include `child` (its hash is not yet computed).
        parent: Box<QueryNode>,
        /// The include key under which `child` was attached.
        key: String,
        child: Arc<QueryNode>,
    },

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// A where clause did not match any known shape.
    #[error("malformed where clause on '{column}': {reason}")]
    MalformedClause { column: String, reason: String },

    /// A registered query id is not known.
    #[error("no registered query with id '{0}'")]
    UnregisteredQuery(String),

    /// A parameter marker has neither a bound nor a default value.
    #[error("parameter '{0}' is not bound")]
    MissingParameter(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::NestedQueryMissingJoinPredicate { .. } => {
                ErrorKind::NestedQueryMissingJoinPredicate
            }
            QueryError::Reference(_) => ErrorKind::Reference,
            QueryError::MalformedClause { .. } => ErrorKind::JsonParsing,
            QueryError::UnregisteredQuery(_) => ErrorKind::UnregisteredQuery,
            QueryError::MissingParameter(_) => ErrorKind::MissingParameter,
        }
    }
}
