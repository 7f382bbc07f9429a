//! kbsearch-text
//!
//! Tantivy-backed keyword engine. Serves `RetrieverType::Keywords` only and
//! keeps a single on-disk (or in-memory) index independent of embedding
//! dimensionality.
pub mod tantivy_utils;
pub mod engine;

pub use engine::TextRetrieveEngine;
