//! The client against a small in-process stand-in for the Elasticsearch API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, head, post, put};
use axum::{Json, Router};
use elasticsearch_sink::{connect_with_retries, ElasticsearchClient, ElasticsearchConfig};
use search_query::{QueryError, SearchExecutor};
use search_sink::{FieldMapping, IndexDocument, IndexMapping, SearchSink, SinkError};
use serde_json::{json, Map, Value};
use sync_core::RetryPolicy;

#[derive(Default)]
struct Cluster {
    mappings: HashMap<String, Value>,
    documents: HashMap<String, Value>,
    bulk_requests: usize,
    throttle: bool,
}

type Shared = Arc<Mutex<Cluster>>;

async fn index_exists(State(cluster): State<Shared>, Path(index): Path<String>) -> StatusCode {
    if cluster.lock().unwrap().mappings.contains_key(&index) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn create_index(
    State(cluster): State<Shared>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut cluster = cluster.lock().unwrap();
    if cluster.mappings.contains_key(&index) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "type": "resource_already_exists_exception", "reason": "exists" } })),
        );
    }
    cluster.mappings.insert(index, body["mappings"].clone());
    (StatusCode::OK, Json(json!({ "acknowledged": true })))
}

async fn update_mapping(
    State(cluster): State<Shared>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut cluster = cluster.lock().unwrap();
    let Some(mapping) = cluster.mappings.get_mut(&index) else {
        return StatusCode::NOT_FOUND;
    };
    for (field, definition) in body["properties"].as_object().unwrap() {
        mapping["properties"][field] = definition.clone();
    }
    StatusCode::OK
}

async fn get_mapping(
    State(cluster): State<Shared>,
    Path(index): Path<String>,
) -> (StatusCode, Json<Value>) {
    let cluster = cluster.lock().unwrap();
    match cluster.mappings.get(&index) {
        Some(mapping) => {
            let mut body = Map::new();
            body.insert(index, json!({ "mappings": mapping }));
            (StatusCode::OK, Json(Value::Object(body)))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "type": "index_not_found_exception", "reason": "no such index" } })),
        ),
    }
}

async fn bulk(State(cluster): State<Shared>, body: String) -> (StatusCode, Json<Value>) {
    let mut cluster = cluster.lock().unwrap();
    cluster.bulk_requests += 1;
    if cluster.throttle {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": { "type": "es_rejected_execution_exception", "reason": "queue full" } })),
        );
    }

    let lines: Vec<Value> = body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    let mut items = Vec::new();
    for pair in lines.chunks(2) {
        let id = pair[0]["index"]["_id"].as_str().unwrap().to_string();
        if pair[1].get("price").is_some_and(|p| !p.is_number()) {
            items.push(json!({ "index": { "_id": id, "status": 400, "error": {
                "type": "mapper_parsing_exception", "reason": "failed to parse field [price]"
            }}}));
        } else {
            cluster.documents.insert(id.clone(), pair[1].clone());
            items.push(json!({ "index": { "_id": id, "status": 200 } }));
        }
    }
    (StatusCode::OK, Json(json!({ "took": 5, "errors": false, "items": items })))
}

async fn search(Path(index): Path<String>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if index != "orders" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "type": "index_not_found_exception", "reason": "no such index" } })),
        );
    }
    if body["sort"][0].get("note").is_some() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "type": "search_phase_execution_exception", "reason": "all shards failed" } })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "hits": {
            "total": { "value": 1, "relation": "eq" },
            "hits": [{ "_id": "1", "_source": { "id": 1 }, "sort": ["1"] }],
        }})),
    )
}

async fn health() -> Json<Value> {
    Json(json!({ "cluster_name": "test", "status": "green" }))
}

async fn cat_indices(State(cluster): State<Shared>) -> Json<Value> {
    let cluster = cluster.lock().unwrap();
    let mut rows: Vec<Value> = cluster
        .mappings
        .keys()
        .map(|name| json!({ "index": name }))
        .collect();
    rows.push(json!({ "index": ".kibana_1" }));
    Json(Value::Array(rows))
}

async fn start() -> (ElasticsearchClient, Shared) {
    let cluster = Shared::default();
    let app = Router::new()
        .route("/_bulk", post(bulk))
        .route("/_cluster/health", get(health))
        .route("/_cat/indices", get(cat_indices))
        .route("/:index", head(index_exists).put(create_index))
        .route("/:index/_mapping", put(update_mapping).get(get_mapping))
        .route("/:index/_search", post(search))
        .with_state(cluster.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ElasticsearchConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout: Duration::from_secs(5),
        ..Default::default()
    };
    (ElasticsearchClient::new(&config).unwrap(), cluster)
}

fn doc(id: &str, source: Value) -> IndexDocument {
    IndexDocument::new(id, source.as_object().unwrap().clone())
}

#[tokio::test]
async fn test_ensure_index_creates_then_extends() {
    let (client, cluster) = start().await;

    let mut mapping = IndexMapping::new();
    mapping.insert("id", FieldMapping::new("long"));
    client.ensure_index("orders", &mapping).await.unwrap();
    assert_eq!(
        cluster.lock().unwrap().mappings["orders"]["properties"]["id"]["type"],
        "long"
    );

    mapping.insert("title", FieldMapping::new("text").with_keyword_subfield());
    client.ensure_index("orders", &mapping).await.unwrap();
    let cluster = cluster.lock().unwrap();
    let title = &cluster.mappings["orders"]["properties"]["title"];
    assert_eq!(title["fields"]["keyword"]["type"], "keyword");
}

#[tokio::test]
async fn test_bulk_upsert_reports_item_failures() {
    let (client, cluster) = start().await;

    let outcome = client
        .bulk_upsert(
            "orders",
            &[
                doc("1", json!({ "id": 1, "price": 9.5 })),
                doc("2", json!({ "id": 2, "price": "n/a" })),
                doc("3", json!({ "id": 3 })),
            ],
        )
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].id, "2");
    assert_eq!(outcome.failures[0].status, 400);
    assert_eq!(cluster.lock().unwrap().documents.len(), 2);
}

#[tokio::test]
async fn test_bulk_upsert_is_idempotent() {
    let (client, cluster) = start().await;
    let docs = [doc("1", json!({ "id": 1 })), doc("2", json!({ "id": 2 }))];

    client.bulk_upsert("orders", &docs).await.unwrap();
    client.bulk_upsert("orders", &docs).await.unwrap();
    assert_eq!(cluster.lock().unwrap().documents.len(), 2);
}

#[tokio::test]
async fn test_bulk_upsert_rate_limited() {
    let (client, cluster) = start().await;
    cluster.lock().unwrap().throttle = true;

    let err = client
        .bulk_upsert("orders", &[doc("1", json!({ "id": 1 }))])
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::RateLimited(ref reason) if reason.contains("queue full")));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_empty_bulk_sends_nothing() {
    let (client, cluster) = start().await;
    let outcome = client.bulk_upsert("orders", &[]).await.unwrap();
    assert_eq!(outcome.succeeded, 0);
    assert_eq!(cluster.lock().unwrap().bulk_requests, 0);
}

#[tokio::test]
async fn test_search_and_error_mapping() {
    let (client, _) = start().await;

    let hits = client
        .search("orders", &json!({ "query": { "match_all": {} }, "sort": [{ "_id": { "order": "asc" } }] }))
        .await
        .unwrap();
    assert_eq!(hits.total, 1);
    assert_eq!(hits.hits[0].sort, vec![json!("1")]);

    let err = client
        .search("invoices", &json!({ "sort": [] }))
        .await
        .unwrap_err();
    assert_eq!(err, QueryError::UnknownIndex("invoices".to_string()));

    let err = client
        .search("orders", &json!({ "sort": [{ "note": { "order": "asc" } }] }))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[tokio::test]
async fn test_mapping_indices_and_health() {
    let (client, _) = start().await;
    client.ensure_index("orders", &IndexMapping::new()).await.unwrap();

    let mapping = client.mapping("orders").await.unwrap();
    assert!(mapping["orders"]["mappings"].is_object());
    assert_eq!(
        client.mapping("missing").await.unwrap_err(),
        QueryError::UnknownIndex("missing".to_string())
    );
    assert_eq!(client.list_indices().await.unwrap(), vec!["orders"]);
    assert_eq!(client.health().await.unwrap().status, "green");
}

#[tokio::test]
async fn test_connect_with_retries_gives_up() {
    // Bind and drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ElasticsearchConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(20));

    let err = connect_with_retries(&config, &policy).await.unwrap_err();
    assert!(format!("{err:#}").contains("after 3 attempts"));
}

#[tokio::test]
async fn test_connect_with_retries_succeeds() {
    let (client, _) = start().await;
    let port: u16 = client.base_url().rsplit(':').next().unwrap().parse().unwrap();
    let config = ElasticsearchConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..Default::default()
    };
    let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
    connect_with_retries(&config, &policy).await.unwrap();
}
