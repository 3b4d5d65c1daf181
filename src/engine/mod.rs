//! Execution engine boundary.
//!
//! An engine turns a validated [`QueryNode`] into an ordered stream of result
//! frames. Every frame is a complete snapshot of the result; a query with
//! deferred (`lazy`) branches yields several, each more resolved than the last.
//! Faults are stream items: a fault before the first frame means nothing was
//! produced, a fault after it ends a partially delivered result.
//!
//! The transports only see this trait. [`MemoryEngine`] is the in-process
//! implementation used by the server binary and the tests.

pub mod deferred;
pub mod memory;
pub mod predicate;

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::error::ErrorKind;
use crate::query::{Cardinality, QueryNode};
use crate::stream::{Frame, StreamFault};

pub use deferred::{is_pending, pending_marker, PENDING_KEY};
pub use memory::{MemoryEngine, Row};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The frames of one execution, in resolution order.
pub type FrameStream = BoxStream<'static, EngineResult<Frame>>;

/// Errors raised while executing a query.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Row count did not match the declared cardinality.
    #[error("query '{name}' expected {expected} row(s) but found {found}")]
    Cardinality {
        name: String,
        expected: Cardinality,
        found: usize,
    },

    /// A `$ref` names a table with no row among the query's ancestors.
    #[error("query '{name}' references {table}.{column} but no enclosing row of '{table}' is in scope")]
    UnresolvedReference {
        name: String,
        table: String,
        column: String,
    },

    /// The engine has no data for a table.
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    /// Failure inside the backend; never shown to clients.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl EngineError {
    /// The wire kind of a known fault; `None` for backend failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Cardinality { .. } => Some(ErrorKind::Cardinality),
            EngineError::UnresolvedReference { .. } => Some(ErrorKind::UnresolvedReference),
            EngineError::UnknownTable(_) => Some(ErrorKind::Reference),
            EngineError::Backend(_) => None,
        }
    }
}

impl StreamFault for EngineError {
    fn fault_kind(&self) -> Option<ErrorKind> {
        self.kind()
    }
}

/// Per-execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Correlates log lines of one request.
    pub request_id: String,
    /// Only the final frame will be delivered, so intermediate frames may be skipped.
    pub return_last_only: bool,
}

impl ExecuteOptions {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            return_last_only: false,
        }
    }

    pub fn with_return_last_only(mut self, return_last_only: bool) -> Self {
        self.return_last_only = return_last_only;
        self
    }
}

/// Produces result frames for validated query trees.
pub trait QueryEngine: Send + Sync {
    /// Start executing `query`.
    ///
    /// Nothing is read until the stream is polled. Dropping the stream abandons
    /// the execution at its next suspension point.
    fn execute(&self, query: Arc<QueryNode>, options: ExecuteOptions) -> FrameStream;
}
