//! Tag-weighted document search over virtual knowledge bases, and batched
//! document metadata lookup.

pub mod lookup;
pub mod repository;
pub mod scoring;
pub mod service;
pub mod types;

pub use lookup::fetch_document_infos;
pub use repository::{DocumentSource, DocumentTagRepository, VirtualKbRepository};
pub use service::TagWeightedSearch;
