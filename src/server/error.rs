use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use search_query::QueryError;
use serde_json::json;
use tracing::{error, warn};

/// A query failure rendered as `{"error": {"category", "message"}}`.
#[derive(Debug)]
pub struct ApiError(pub QueryError);

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        Self(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            QueryError::Validation(_) | QueryError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            QueryError::UnknownIndex(_) => StatusCode::NOT_FOUND,
            QueryError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Query failed: {}", self.0);
        } else {
            warn!("Rejected query: {}", self.0);
        }
        let body = json!({
            "error": {
                "category": self.0.category().as_str(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
