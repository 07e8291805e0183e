//! Search index sink trait abstraction.
//!
//! This crate defines the `SearchSink` trait that the sync engine writes
//! through. `elasticsearch-sink` implements it over the Elasticsearch REST
//! API; tests implement it in memory.
//!
//! The types here carry plain JSON documents so that source crates never
//! depend on a particular search engine client.

mod error;
mod mapping;
mod traits;

pub use error::SinkError;
pub use mapping::{FieldMapping, IndexMapping};
pub use traits::{BulkItemFailure, BulkOutcome, IndexDocument, SearchSink};
