use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use search_sink::{BulkOutcome, IndexDocument, IndexMapping, SearchSink, SinkError};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::bulk::{bulk_body, parse_bulk_response};
use crate::client::ElasticsearchClient;
use crate::error::{sink_error, transport_reason};

fn transport(error: reqwest::Error) -> SinkError {
    SinkError::Transport(transport_reason(&error))
}

impl ElasticsearchClient {
    async fn put_mapping(&self, index: &str, mapping: &IndexMapping) -> Result<(), SinkError> {
        let request = self
            .request(Method::PUT, &format!("{index}/_mapping"))
            .json(&mapping.to_json());
        let (status, body) = self.send(request).await.map_err(transport)?;
        if (200..300).contains(&status) {
            debug!("Updated mapping of index {index}");
            Ok(())
        } else {
            Err(sink_error(status, &body))
        }
    }
}

#[async_trait::async_trait]
impl SearchSink for ElasticsearchClient {
    async fn ensure_index(&self, index: &str, mapping: &IndexMapping) -> Result<(), SinkError> {
        let (status, _) = self
            .send(self.request(Method::HEAD, index))
            .await
            .map_err(transport)?;

        match status {
            200 => self.put_mapping(index, mapping).await,
            404 => {
                let request = self
                    .request(Method::PUT, index)
                    .json(&json!({ "mappings": mapping.to_json() }));
                let (status, body) = self.send(request).await.map_err(transport)?;
                if (200..300).contains(&status) {
                    info!("Created index {index}");
                    return Ok(());
                }
                // Lost a race with another creator
                if body.pointer("/error/type").and_then(Value::as_str)
                    == Some("resource_already_exists_exception")
                {
                    return self.put_mapping(index, mapping).await;
                }
                Err(sink_error(status, &body))
            }
            status => Err(sink_error(status, &Value::Null)),
        }
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<BulkOutcome, SinkError> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let request = self
            .request(Method::POST, "_bulk")
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(index, documents));
        let (status, body) = self.send(request).await.map_err(transport)?;
        if !(200..300).contains(&status) {
            return Err(sink_error(status, &body));
        }
        parse_bulk_response(&body, documents)
    }
}
