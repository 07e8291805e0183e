//! The search API driven through its axum router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pg_search_sync::server::{router, AppState, SourceProbe};
use search_query::{EngineHealth, Hit, QueryError, SearchExecutor, SearchHits};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Holds documents `001`..`n` of index `orders`, sorted by id.
struct FakeEngine {
    docs: Vec<Value>,
    failure: Mutex<Option<QueryError>>,
}

impl FakeEngine {
    fn new(count: usize) -> Self {
        let docs = (1..=count)
            .map(|n| json!({ "id": n, "name": format!("order {n}"), "secret": "x" }))
            .collect();
        Self {
            docs,
            failure: Mutex::new(None),
        }
    }

    fn fail_with(self, error: QueryError) -> Self {
        *self.failure.lock().unwrap() = Some(error);
        self
    }

    fn check(&self, index: &str) -> Result<(), QueryError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        if index != "orders" {
            return Err(QueryError::UnknownIndex(index.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchExecutor for FakeEngine {
    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, QueryError> {
        self.check(index)?;
        let after = body["search_after"][0].as_str().map(str::to_string);
        let from = body["from"].as_u64().unwrap_or(0) as usize;
        let size = body["size"].as_u64().unwrap() as usize;

        let hits = self
            .docs
            .iter()
            .map(|doc| (format!("{:03}", doc["id"].as_u64().unwrap()), doc))
            .filter(|(id, _)| after.as_ref().map_or(true, |after| id > after))
            .skip(from)
            .take(size)
            .map(|(id, doc)| Hit {
                sort: vec![json!(id)],
                id,
                source: doc.as_object().unwrap().clone(),
            })
            .collect();
        Ok(SearchHits {
            total: self.docs.len() as u64,
            hits,
        })
    }

    async fn mapping(&self, index: &str) -> Result<Value, QueryError> {
        self.check(index)?;
        Ok(json!({ "orders": { "mappings": { "properties": {
            "id": { "type": "long" },
            "name": { "type": "text" },
        }}}}))
    }

    async fn list_indices(&self) -> Result<Vec<String>, QueryError> {
        self.check("orders")?;
        Ok(vec!["orders".to_string()])
    }

    async fn health(&self) -> Result<EngineHealth, QueryError> {
        self.check("orders")?;
        Ok(EngineHealth {
            status: "yellow".to_string(),
        })
    }
}

struct FakeSource {
    up: AtomicBool,
}

#[async_trait]
impl SourceProbe for FakeSource {
    async fn ping(&self) -> anyhow::Result<()> {
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            bail!("connection refused")
        }
    }
}

fn app(engine: FakeEngine, source_up: bool) -> Router {
    let source = FakeSource {
        up: AtomicBool::new(source_up),
    };
    router(AppState::new(engine, source))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_search(body: Value) -> Request<Body> {
    Request::post("/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_offset_search() {
    let app = app(FakeEngine::new(25), true);

    let (status, body) = send(
        &app,
        post_search(json!({
            "index": "orders",
            "page": 3,
            "page_size": 10,
            "exclude_fields": ["secret"],
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["data"][0], json!({ "id": 21, "name": "order 21" }));
    assert_eq!(
        body["meta"],
        json!({
            "total_records": 25,
            "page_size": 10,
            "current_page": 3,
            "total_pages": 3,
            "has_next": false,
            "has_previous": true,
            "selected_fields": null,
        })
    );
}

#[tokio::test]
async fn test_cursor_search_follows_next_cursor() {
    let app = app(FakeEngine::new(25), true);

    let (_, first) = send(
        &app,
        post_search(json!({ "index": "orders", "size": 10, "cursor": "" })),
    )
    .await;
    assert_eq!(first["meta"]["has_next"], true);
    assert_eq!(first["meta"]["has_previous"], false);
    assert!(first["meta"].get("current_page").is_none());

    let cursor = first["meta"]["next_cursor"].as_str().unwrap();
    let (status, second) = send(
        &app,
        post_search(json!({ "index": "orders", "size": 10, "cursor": cursor })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"][0]["id"], 11);
    assert_eq!(second["meta"]["has_previous"], true);
}

#[tokio::test]
async fn test_scroll() {
    let app = app(FakeEngine::new(12), true);

    let (status, first) = send(&app, get("/search/orders/scroll?size=5&fields=id")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"][0], json!({ "id": 1 }));
    assert_eq!(first["meta"]["selected_fields"], json!(["id"]));

    let mut cursor = first["meta"]["next_cursor"].as_str().unwrap().to_string();
    let mut seen = 5;
    loop {
        let (_, page) = send(
            &app,
            get(&format!("/search/orders/scroll?size=5&fields=id&cursor={cursor}")),
        )
        .await;
        seen += page["data"].as_array().unwrap().len();
        match page["meta"]["next_cursor"].as_str() {
            Some(next) => cursor = next.to_string(),
            None => break,
        }
    }
    assert_eq!(seen, 12);
}

#[tokio::test]
async fn test_validation_errors() {
    let app = app(FakeEngine::new(5), true);

    let (status, body) = send(
        &app,
        post_search(json!({
            "index": "orders",
            "query_fields": { "price": { "between": [1, 2] } },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");
    assert!(body["error"]["message"].as_str().unwrap().contains("between"));

    let (status, body) = send(&app, post_search(json!({ "index": "orders", "page_size": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");

    let (status, body) = send(&app, get("/search/orders/scroll?cursor=bogus")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");

    let (status, body) = send(&app, get("/search/orders/scroll?size=many")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let app = app(FakeEngine::new(5), true);
    let request = Request::post("/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"index\": "))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");
}

#[tokio::test]
async fn test_unknown_index() {
    let app = app(FakeEngine::new(5), true);
    let (status, body) = send(&app, get("/indices/invoices/fields")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["category"], "validation");
}

#[tokio::test]
async fn test_engine_errors() {
    let app_down = app(
        FakeEngine::new(5).fail_with(QueryError::Transport("connection failed".to_string())),
        true,
    );
    let (status, body) = send(&app_down, post_search(json!({ "index": "orders" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["category"], "unavailable");

    let app_broken = app(
        FakeEngine::new(5).fail_with(QueryError::Engine("status 500: boom".to_string())),
        true,
    );
    let (status, body) = send(&app_broken, get("/indices")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["category"], "engine");
}

#[tokio::test]
async fn test_fields_and_indices() {
    let app = app(FakeEngine::new(1), true);

    let (status, body) = send(&app, get("/indices/orders/fields")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "index": "orders",
            "fields": ["id", "name"],
            "field_types": { "id": "long", "name": "text" },
        })
    );

    let (status, body) = send(&app, get("/indices")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["orders"]));
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(FakeEngine::new(1), true), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "healthy", "source": "ok", "search": "yellow" })
    );

    let (status, body) = send(&app(FakeEngine::new(1), false), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["source"], "unreachable");

    let engine = FakeEngine::new(1).fail_with(QueryError::Transport("timeout".to_string()));
    let (status, body) = send(&app(engine, true), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["search"], "unreachable");
}
