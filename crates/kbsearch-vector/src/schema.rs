use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const COLLECTION_NAME_PREFIX: &str = "embeddings";
pub const DEFAULT_DIMENSION: usize = 1536;
/// Upper bound on `content`, sized for the largest chunk plus overlap the
/// ingestion side can produce.
pub const MAX_CONTENT_BYTES: usize = 6000;

pub const CHUNK_ID: &str = "chunk_id";
pub const VECTOR: &str = "vector";
pub const CONTENT: &str = "content";
pub const SOURCE_TYPE: &str = "source_type";
pub const SOURCE_ID: &str = "source_id";
pub const KNOWLEDGE_BASE_ID: &str = "knowledge_base_id";
pub const KNOWLEDGE_ID: &str = "knowledge_id";

/// Columns returned by searches; `vector` is left out to keep results small.
pub const OUTPUT_COLUMNS: [&str; 6] = [CHUNK_ID, CONTENT, SOURCE_TYPE, SOURCE_ID, KNOWLEDGE_BASE_ID, KNOWLEDGE_ID];

pub fn collection_name(dim: usize) -> String {
	format!("{}{}", COLLECTION_NAME_PREFIX, dim)
}

pub fn vector_field(dim: usize) -> Field {
	Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true)
}

pub fn build_arrow_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(CHUNK_ID, DataType::Utf8, false),
		vector_field(dim),
		Field::new(CONTENT, DataType::Utf8, false),
		Field::new(SOURCE_TYPE, DataType::Int32, false),
		Field::new(SOURCE_ID, DataType::Utf8, false),
		Field::new(KNOWLEDGE_BASE_ID, DataType::Utf8, false),
		Field::new(KNOWLEDGE_ID, DataType::Utf8, false),
	]))
}
