//! Schema retrieval: the cached catalog and per-request candidate selection.

pub mod catalog;
pub mod retriever;

pub use catalog::{SchemaCatalog, SchemaSource};
pub use retriever::{CandidateSelector, CandidateSet};
