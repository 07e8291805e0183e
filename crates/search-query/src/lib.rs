//! Query side of pg-search-sync
//!
//! Turns a declarative filter request into an Elasticsearch search body and
//! paginates results by offset or by an opaque cursor.
//!
//! - [`FilterSpec`] is the parsed `query_fields` object; invalid shapes never
//!   reach the engine
//! - [`QueryBuilder`] compiles filter, sort, projection and page into a body
//! - [`cursor`] encodes search-after positions bound to an index and sort
//! - [`SearchService`] ties it together over any [`SearchExecutor`]

mod builder;
mod catalog;
pub mod cursor;
mod error;
mod executor;
mod filter;
pub mod pagination;
mod projection;
mod service;
mod sort;

pub use builder::{compile_filter, QueryBuilder};
pub use catalog::FieldCatalog;
pub use error::{ErrorCategory, QueryError};
pub use executor::{EngineHealth, Hit, SearchExecutor, SearchHits};
pub use filter::{FieldFilter, FilterSpec, RangeBounds};
pub use pagination::{OffsetPage, PaginationMeta};
pub use projection::Projection;
pub use service::{validate_index, ScrollParams, SearchRequest, SearchResponse, SearchService};
pub use sort::{SortField, SortOrder, SortSpec};
