//! Query composition: the query tree, its builder, validation, and identity.
//!
//! ```text
//! QueryBuilder ──terminal call──▶ validate ──▶ hash_query ──▶ QueryNode
//!      ▲                                                        │
//!      └────────────────────── to_builder ──────────────────────┘
//! ```

pub mod builder;
pub mod clause;
pub mod document;
pub mod error;
pub mod hash;
pub mod node;
pub mod reference;
pub mod validate;

pub use builder::QueryBuilder;
pub use clause::{Operand, Operator, QueryParam, WhereClause, PARAM_MARKER};
pub use document::{QueryDocument, QueryRequest, SelectSpec, REGISTERED_QUERY};
pub use error::{QueryError, QueryResult};
pub use hash::{canonical_json, canonical_value, djb2, hash_query, to_sorted_json};
pub use node::{Cardinality, QueryNode};
pub use reference::{is_ref_op, reference, reference_path, RefOp, REF_KEY};
pub use validate::{check_join_safety, has_join_predicate, problems, problems_in_tree, validate};
