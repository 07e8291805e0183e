//! The seam between the query layer and a search engine.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::QueryError;

/// One hit of a search response.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub source: Map<String, Value>,
    /// Sort values, the position a cursor resumes after
    pub sort: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<Hit>,
}

/// Cluster state as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHealth {
    /// `green`, `yellow` or `red`
    pub status: String,
}

/// Executes compiled requests. Implemented over HTTP by `elasticsearch-sink`.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    /// Run a search body against an index.
    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, QueryError>;

    /// Raw `GET /{index}/_mapping` response.
    async fn mapping(&self, index: &str) -> Result<Value, QueryError>;

    async fn list_indices(&self) -> Result<Vec<String>, QueryError>;

    async fn health(&self) -> Result<EngineHealth, QueryError>;
}

#[async_trait]
impl<T: SearchExecutor + ?Sized> SearchExecutor for std::sync::Arc<T> {
    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, QueryError> {
        (**self).search(index, body).await
    }

    async fn mapping(&self, index: &str) -> Result<Value, QueryError> {
        (**self).mapping(index).await
    }

    async fn list_indices(&self) -> Result<Vec<String>, QueryError> {
        (**self).list_indices().await
    }

    async fn health(&self) -> Result<EngineHealth, QueryError> {
        (**self).health().await
    }
}
