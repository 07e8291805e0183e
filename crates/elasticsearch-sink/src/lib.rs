//! Elasticsearch over its REST API.
//!
//! [`ElasticsearchClient`] implements both seams the rest of the workspace is
//! written against: [`search_sink::SearchSink`] for the sync engine and
//! [`search_query::SearchExecutor`] for the query API. Response parsing lives
//! in plain functions so it can be tested without a cluster.

mod bulk;
mod client;
mod config;
mod error;
mod executor;
mod response;
mod sink;

pub use bulk::{bulk_body, parse_bulk_response};
pub use client::{connect_with_retries, ElasticsearchClient};
pub use config::ElasticsearchConfig;
pub use error::{error_reason, query_error, sink_error};
pub use response::{parse_health, parse_indices, parse_search_response};
