use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "text_with_stopwords";

/// Resolved handles for every field of [`build_schema`].
#[derive(Debug, Clone, Copy)]
pub struct TextFields {
	pub chunk_id: Field,
	pub content: Field,
	pub source_id: Field,
	pub source_type: Field,
	pub knowledge_id: Field,
	pub knowledge_base_id: Field,
}

impl TextFields {
	pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			chunk_id: schema.get_field("chunk_id")?,
			content: schema.get_field("content")?,
			source_id: schema.get_field("source_id")?,
			source_type: schema.get_field("source_type")?,
			knowledge_id: schema.get_field("knowledge_id")?,
			knowledge_base_id: schema.get_field("knowledge_base_id")?,
		})
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("chunk_id", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field("content", text_options);
	schema_builder.add_text_field("source_id", STRING | STORED);
	schema_builder.add_i64_field("source_type", STORED);
	schema_builder.add_text_field("knowledge_id", STRING | STORED);
	schema_builder.add_text_field("knowledge_base_id", STRING | STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}
