use reqwest::Method;
use search_query::{EngineHealth, QueryError, SearchExecutor, SearchHits};
use serde_json::Value;

use crate::client::ElasticsearchClient;
use crate::error::{query_error, transport_reason};
use crate::response::{parse_health, parse_indices, parse_search_response};

fn transport(error: reqwest::Error) -> QueryError {
    QueryError::Transport(transport_reason(&error))
}

impl ElasticsearchClient {
    async fn read(&self, index: &str, request: reqwest::RequestBuilder) -> Result<Value, QueryError> {
        let (status, body) = self.send(request).await.map_err(transport)?;
        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(query_error(index, status, &body))
        }
    }
}

#[async_trait::async_trait]
impl SearchExecutor for ElasticsearchClient {
    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, QueryError> {
        let request = self
            .request(Method::POST, &format!("{index}/_search"))
            .json(body);
        let response = self.read(index, request).await?;
        parse_search_response(&response)
    }

    async fn mapping(&self, index: &str) -> Result<Value, QueryError> {
        let request = self.request(Method::GET, &format!("{index}/_mapping"));
        self.read(index, request).await
    }

    async fn list_indices(&self) -> Result<Vec<String>, QueryError> {
        let request = self.request(Method::GET, "_cat/indices?format=json&h=index");
        let response = self.read("_cat", request).await?;
        Ok(parse_indices(&response))
    }

    async fn health(&self) -> Result<EngineHealth, QueryError> {
        let request = self.request(Method::GET, "_cluster/health");
        let response = self.read("_cluster", request).await?;
        parse_health(&response)
    }
}
