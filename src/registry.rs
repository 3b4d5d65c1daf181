//! Registered queries.
//!
//! A registered query is stored under its identity hash. Clients then send only
//! the id and the parameter values:
//!
//! ```json
//! { "type": "registered-query", "queryId": "<hash>", "params": { "id": 4 } }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::query::{QueryDocument, QueryError, QueryNode, QueryResult};
use crate::schema::Schema;

/// Errors loading a registry file.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read registry file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse registry file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid registered query #{index}: {source}")]
    InvalidQuery {
        index: usize,
        #[source]
        source: QueryError,
    },
}

/// Queries known to the server, keyed by identity hash.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    queries: DashMap<String, Arc<QueryNode>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of query documents, building each against `schema`.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        schema: Option<&Arc<Schema>>,
    ) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RegistryError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let documents: Vec<QueryDocument> = serde_json::from_str(&content)?;

        let registry = Self::new();
        for (index, document) in documents.iter().enumerate() {
            let node = document
                .into_query(schema)
                .map_err(|source| RegistryError::InvalidQuery { index, source })?;
            let id = registry.register(node);
            log::debug!("Registered query {} from {}", id, path.display());
        }
        Ok(registry)
    }

    /// Register `node`, returning its id. Registering the same tree twice is a no-op.
    pub fn register(&self, node: impl Into<Arc<QueryNode>>) -> String {
        let node = node.into();
        let id = node.hash().to_string();
        self.queries.entry(id.clone()).or_insert(node);
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<QueryNode>> {
        self.queries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.queries.contains_key(id)
    }

    /// Look up `id` and bind `params` into its parameter markers.
    pub fn bind(&self, id: &str, params: &Map<String, Value>) -> QueryResult<QueryNode> {
        let node = self
            .get(id)
            .ok_or_else(|| QueryError::UnregisteredQuery(id.to_string()))?;
        node.bind_params(params)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.queries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
