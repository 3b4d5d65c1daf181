//! Wire-visible error taxonomy.
//!
//! Every fault that can reach a client is reported as an [`ErrorDocument`]:
//!
//! ```text
//! { "type": "<ErrorKind>", "error": "<human-readable message>" }
//! ```
//!
//! Faults found before anything is written (bad JSON, unsafe query trees, schema
//! reference errors) are sent with a client-error status. Faults found after the
//! first byte is flushed become the final line of the stream instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::query::QueryError;

/// Result type for request handling.
pub type Result<T> = std::result::Result<T, Error>;

/// The `type` discriminator of an [`ErrorDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request body is not valid JSON, or not a query document.
    JsonParsing,
    /// A nested query has no `$ref` where clause tying it to its parent.
    NestedQueryMissingJoinPredicate,
    /// A table or column does not exist in the schema, or lacks a required flag.
    Reference,
    /// A fault after streaming began.
    ResponseStreamingFault,
    /// A line of a result stream could not be decoded.
    MalformedFrame,
    /// Row count did not match the declared cardinality.
    Cardinality,
    /// A registered query id is not known to the server.
    UnregisteredQuery,
    /// A parameter marker was neither bound nor given a default value.
    MissingParameter,
    /// A `$ref` points at a table with no row in scope.
    UnresolvedReference,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::JsonParsing,
        ErrorKind::NestedQueryMissingJoinPredicate,
        ErrorKind::Reference,
        ErrorKind::ResponseStreamingFault,
        ErrorKind::MalformedFrame,
        ErrorKind::Cardinality,
        ErrorKind::UnregisteredQuery,
        ErrorKind::MissingParameter,
        ErrorKind::UnresolvedReference,
    ];

    /// The string used in the `type` field on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::JsonParsing => "JsonParsingError",
            ErrorKind::NestedQueryMissingJoinPredicate => "NestedQueryMissingJoinPredicate",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::ResponseStreamingFault => "ResponseStreamingFault",
            ErrorKind::MalformedFrame => "MalformedFrame",
            ErrorKind::Cardinality => "CardinalityError",
            ErrorKind::UnregisteredQuery => "UnregisteredQuery",
            ErrorKind::MissingParameter => "MissingParameter",
            ErrorKind::UnresolvedReference => "UnresolvedReference",
        }
    }

    /// Parse a wire `type` string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ "type": ..., "error": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
}

impl ErrorDocument {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            error: message.into(),
        }
    }

    /// Recognise an error document among decoded frames.
    ///
    /// Only an object with exactly the two string fields `type` and `error` counts.
    pub fn from_frame(frame: &serde_json::Value) -> Option<Self> {
        let obj = frame.as_object()?;
        if obj.len() != 2 {
            return None;
        }
        let kind = obj.get("type")?.as_str()?;
        let error = obj.get("error")?.as_str()?;
        Some(Self {
            kind: kind.to_string(),
            error: error.to_string(),
        })
    }

    /// The document as a frame value.
    pub fn to_frame(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".to_string(), serde_json::Value::String(self.kind.clone()));
        obj.insert("error".to_string(), serde_json::Value::String(self.error.clone()));
        serde_json::Value::Object(obj)
    }

    /// The parsed kind, if it is one this crate knows.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        ErrorKind::parse(&self.kind)
    }
}

/// Top-level error for serving a query request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse request body: {0}")]
    JsonParsing(#[source] serde_json::Error),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl Error {
    /// The wire kind of a known fault; `None` for faults that must not be shown to clients.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::JsonParsing(_) => Some(ErrorKind::JsonParsing),
            Error::Query(err) => Some(err.kind()),
            Error::Engine(err) => err.kind(),
        }
    }

    /// Render a known fault as an error document.
    pub fn to_document(&self) -> Option<ErrorDocument> {
        self.kind().map(|kind| ErrorDocument::new(kind, self.to_string()))
    }
}
