//! LanceDB retrieval engine: one collection per embedding dimensionality,
//! dense vector search over inner product and BM25 keyword search over the
//! `content` column.

pub mod copy;
pub mod engine;
pub mod schema;
pub mod search;
pub mod storage;
pub mod table;
pub mod writer;

pub use engine::{VectorEngineSettings, VectorRetrieveEngine};
