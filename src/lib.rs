//! # Tributary
//!
//! Declarative nested queries with incremental result streaming.
//!
//! ## Architecture
//!
//! A caller composes one document describing a primary query plus a tree of
//! nested queries, each joined to its parent by a `$ref` where clause. The
//! server executes it and streams progressively resolved snapshots back as
//! newline-delimited JSON.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        QueryBuilder / QueryDocument (client side)        │
//! │   from, select, where, include, cardinality, lazy, ...   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validate: join safety, schema]
//! ┌─────────────────────────────────────────────────────────┐
//! │            QueryNode (immutable, identity hash)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [POST /query]
//! ┌─────────────────────────────────────────────────────────┐
//! │       QueryEngine ──▶ frames (pending ──▶ resolved)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [NDJSON, or last frame only]
//! ┌─────────────────────────────────────────────────────────┐
//! │            FrameReader / QueryClient (consumer)          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod registry;
pub mod schema;
pub mod stream;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod web;

pub use error::{Error, ErrorDocument, ErrorKind, Result};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::engine::{ExecuteOptions, FrameStream, MemoryEngine, QueryEngine};
    pub use crate::error::{ErrorDocument, ErrorKind};
    pub use crate::query::{
        reference, Cardinality, Operator, QueryBuilder, QueryError, QueryNode, QueryParam,
        QueryRequest, RefOp, WhereClause,
    };
    pub use crate::registry::QueryRegistry;
    pub use crate::schema::{ColumnSchema, Schema};
    pub use crate::stream::{collect_last, Frame, FrameReader};
}
