//! Request handling for the search API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::builder::QueryBuilder;
use crate::catalog::FieldCatalog;
use crate::cursor;
use crate::error::QueryError;
use crate::executor::{EngineHealth, SearchExecutor, SearchHits};
use crate::filter::FilterSpec;
use crate::pagination::{cursor_meta, page_size, OffsetPage, PaginationMeta};
use crate::projection::Projection;
use crate::sort::SortSpec;

/// Body of `POST /search`.
///
/// A `cursor` selects cursor pagination; an empty one asks for the first
/// page. Without it the request is paged by `page`/`page_size` and `size` is
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
    pub index: String,
    #[serde(default)]
    pub query_fields: Map<String, Value>,
    pub fields: Option<Vec<String>>,
    pub exclude_fields: Option<Vec<String>>,
    pub size: Option<u32>,
    pub sort_by: Option<Map<String, Value>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub cursor: Option<String>,
}

impl SearchRequest {
    fn uses_cursor(&self) -> Result<bool, QueryError> {
        let offset = self.page.is_some() || self.page_size.is_some();
        if self.cursor.is_some() && offset {
            return Err(QueryError::validation(
                "cursor cannot be combined with page or page_size",
            ));
        }
        Ok(self.cursor.is_some())
    }
}

/// Query string of `GET /search/{index}/scroll`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScrollParams {
    pub cursor: Option<String>,
    pub size: Option<u32>,
    pub sort_by: Option<String>,
    pub fields: Option<String>,
    pub exclude_fields: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub data: Vec<Map<String, Value>>,
    pub meta: PaginationMeta,
}

/// Validates requests, runs them through a [`SearchExecutor`] and assembles
/// responses. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct SearchService<E> {
    executor: E,
}

impl<E: SearchExecutor> SearchService<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, QueryError> {
        validate_index(&request.index)?;
        let uses_cursor = request.uses_cursor()?;
        let filter = FilterSpec::parse(&request.query_fields)?;
        let projection = Projection::new(request.fields, request.exclude_fields)?;
        let sort = match &request.sort_by {
            Some(sort_by) => SortSpec::from_map(sort_by)?,
            None => SortSpec::default(),
        };
        let builder = QueryBuilder::new(&filter)
            .sort(sort.clone())
            .projection(projection.clone());

        if uses_cursor {
            let size = page_size("size", request.size)?;
            self.cursor_page(&request.index, builder, &sort, &projection, request.cursor.as_deref(), size)
                .await
        } else {
            let page = OffsetPage::new(request.page, request.page_size)?;
            let body = builder.offset(page.from(), page.page_size).build();
            let hits = self.run(&request.index, &body).await?;
            Ok(SearchResponse {
                meta: page.meta(hits.total, projection.selected_fields()),
                data: project(hits, &projection),
            })
        }
    }

    pub async fn scroll(&self, index: &str, params: ScrollParams) -> Result<SearchResponse, QueryError> {
        validate_index(index)?;
        let projection = Projection::from_params(params.fields.as_deref(), params.exclude_fields.as_deref())?;
        let sort = match params.sort_by.as_deref() {
            Some(sort_by) => SortSpec::from_param(sort_by)?,
            None => SortSpec::default(),
        };
        let size = page_size("size", params.size)?;
        let builder = QueryBuilder::match_all()
            .sort(sort.clone())
            .projection(projection.clone());

        self.cursor_page(index, builder, &sort, &projection, params.cursor.as_deref(), size)
            .await
    }

    pub async fn fields(&self, index: &str) -> Result<FieldCatalog, QueryError> {
        validate_index(index)?;
        let response = self.executor.mapping(index).await?;
        FieldCatalog::from_mapping_response(index, &response)
    }

    pub async fn indices(&self) -> Result<Vec<String>, QueryError> {
        let mut indices = self.executor.list_indices().await?;
        indices.sort();
        Ok(indices)
    }

    pub async fn health(&self) -> Result<EngineHealth, QueryError> {
        self.executor.health().await
    }

    async fn cursor_page(
        &self,
        index: &str,
        builder: QueryBuilder,
        sort: &SortSpec,
        projection: &Projection,
        cursor: Option<&str>,
        size: u32,
    ) -> Result<SearchResponse, QueryError> {
        let cursor = cursor.filter(|c| !c.trim().is_empty());
        let after = cursor
            .map(|c| cursor::decode(c, index, sort))
            .transpose()?;

        let body = builder.search_after(after, size).build();
        let hits = self.run(index, &body).await?;
        let next_cursor = hits
            .hits
            .last()
            .filter(|hit| !hit.sort.is_empty())
            .map(|hit| cursor::encode(index, sort, hit.sort.clone()));

        Ok(SearchResponse {
            meta: cursor_meta(
                hits.total,
                size,
                hits.hits.len(),
                cursor.is_some(),
                next_cursor,
                projection.selected_fields(),
            ),
            data: project(hits, projection),
        })
    }

    async fn run(&self, index: &str, body: &Value) -> Result<SearchHits, QueryError> {
        debug!("Searching {index}: {body}");
        self.executor.search(index, body).await
    }
}

fn project(hits: SearchHits, projection: &Projection) -> Vec<Map<String, Value>> {
    hits.hits
        .into_iter()
        .map(|hit| projection.apply(hit.source))
        .collect()
}

/// Reject names that would address more than one index or a system API.
pub fn validate_index(index: &str) -> Result<(), QueryError> {
    const FORBIDDEN: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ',', '#', ' ', ':'];
    if index.is_empty() {
        return Err(QueryError::validation("index must not be empty"));
    }
    if index.starts_with(['_', '-', '+']) || index.contains(FORBIDDEN) {
        return Err(QueryError::validation(format!("Invalid index name '{index}'")));
    }
    Ok(())
}
