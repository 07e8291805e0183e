//! The `serve` command: search API over HTTP.

mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use pg_search_sync_postgresql_source::PgPool;
use search_query::{
    FieldCatalog, QueryError, ScrollParams, SearchExecutor, SearchRequest, SearchResponse,
    SearchService,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::ApiError;

/// Liveness check of the relational store.
#[async_trait]
pub trait SourceProbe: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl SourceProbe for PgPool {
    async fn ping(&self) -> Result<()> {
        PgPool::ping(self).await
    }
}

pub struct AppState<E, P> {
    pub search: Arc<SearchService<E>>,
    pub source: Arc<P>,
}

impl<E, P> Clone for AppState<E, P> {
    fn clone(&self) -> Self {
        Self {
            search: self.search.clone(),
            source: self.source.clone(),
        }
    }
}

impl<E: SearchExecutor, P> AppState<E, P> {
    pub fn new(executor: E, source: P) -> Self {
        Self {
            search: Arc::new(SearchService::new(executor)),
            source: Arc::new(source),
        }
    }
}

pub fn router<E, P>(state: AppState<E, P>) -> Router
where
    E: SearchExecutor + 'static,
    P: SourceProbe + 'static,
{
    Router::new()
        .route("/search", post(search::<E, P>))
        .route("/search/:index/scroll", get(scroll::<E, P>))
        .route("/indices", get(indices::<E, P>))
        .route("/indices/:index/fields", get(fields::<E, P>))
        .route("/health", get(health::<E, P>))
        .with_state(state)
}

async fn search<E: SearchExecutor, P>(
    State(state): State<AppState<E, P>>,
    request: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = request.map_err(|e| QueryError::Validation(e.body_text()))?;
    Ok(Json(state.search.search(request).await?))
}

async fn scroll<E: SearchExecutor, P>(
    State(state): State<AppState<E, P>>,
    Path(index): Path<String>,
    params: Result<Query<ScrollParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = params.map_err(|e| QueryError::Validation(e.body_text()))?;
    Ok(Json(state.search.scroll(&index, params).await?))
}

async fn indices<E: SearchExecutor, P>(
    State(state): State<AppState<E, P>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.search.indices().await?))
}

async fn fields<E: SearchExecutor, P>(
    State(state): State<AppState<E, P>>,
    Path(index): Path<String>,
) -> Result<Json<FieldCatalog>, ApiError> {
    Ok(Json(state.search.fields(&index).await?))
}

/// 200 when both stores answer, 503 otherwise.
async fn health<E: SearchExecutor, P: SourceProbe>(
    State(state): State<AppState<E, P>>,
) -> (StatusCode, Json<Value>) {
    let (source, search) = tokio::join!(state.source.ping(), state.search.health());

    let source_status = match &source {
        Ok(()) => "ok",
        Err(_) => "unreachable",
    };
    let search_status = match &search {
        Ok(health) => health.status.clone(),
        Err(_) => "unreachable".to_string(),
    };
    // A red cluster still counts as reachable
    let healthy = source.is_ok() && search.is_ok();

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "source": source_status,
        "search": search_status,
    });
    (status, Json(body))
}

/// Serve the API on `bind` until `shutdown` fires.
pub async fn serve<E, P>(
    bind: SocketAddr,
    state: AppState<E, P>,
    shutdown: CancellationToken,
) -> Result<()>
where
    E: SearchExecutor + 'static,
    P: SourceProbe + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}
