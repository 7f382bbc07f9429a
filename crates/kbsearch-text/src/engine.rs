use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, error, info, warn};

use kbsearch_core::error::{Error, Result};
use kbsearch_core::traits::RetrieveEngine;
use kbsearch_core::types::{
	CopyIndicesRequest, EngineType, IndexInfo, IndexWithScore, MatchType, RetrieveParams, RetrieveResult, RetrieverType, SaveParams,
	SourceType,
};

use crate::tantivy_utils::{build_schema, register_tokenizer, TextFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;
/// Per-record stored-field and posting overhead used by the storage estimate.
pub const METADATA_OVERHEAD_BYTES: u64 = 200;
pub const DEFAULT_COPY_BATCH_SIZE: usize = 500;

/// Keyword-only engine over a Tantivy index.
///
/// Writes go through a single writer and are visible to searches as soon as
/// the call returns. `dimension` arguments are accepted for interface parity
/// and ignored: the index holds every dimensionality's chunks.
///
/// Commits and searches run synchronously on the calling task, so the async
/// trait methods block their executor thread for the duration of the call.
pub struct TextRetrieveEngine {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: TextFields,
	copy_batch_size: usize,
}

impl TextRetrieveEngine {
	/// Opens the index under `index_dir`, creating it when absent.
	pub fn open(index_dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(index_dir).map_err(Error::backend)?;
		let dir = MmapDirectory::open(index_dir).map_err(Error::backend)?;
		let index = Index::open_or_create(dir, build_schema()).map_err(|e| {
			error!(path = %index_dir.display(), error = %e, "failed to open text index");
			Error::backend(e)
		})?;
		info!(path = %index_dir.display(), "text index opened");
		Self::from_index(index)
	}

	pub fn in_memory() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = TextFields::from_schema(&index.schema()).map_err(Error::backend)?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(Error::backend)?;
		let writer: IndexWriter = index.writer(WRITER_HEAP_BYTES).map_err(Error::backend)?;
		Ok(Self { index, reader, writer: Mutex::new(writer), fields, copy_batch_size: DEFAULT_COPY_BATCH_SIZE })
	}

	pub fn with_copy_batch_size(mut self, batch_size: usize) -> Self {
		self.copy_batch_size = batch_size.max(1);
		self
	}

	pub fn num_docs(&self) -> u64 {
		self.reader.searcher().num_docs()
	}

	fn term(&self, field: Field, value: &str) -> Term {
		Term::from_field_text(field, value)
	}

	fn to_document(&self, info: &IndexInfo) -> TantivyDocument {
		let f = &self.fields;
		doc!(
			f.chunk_id => info.chunk_id.clone(),
			f.content => info.content.clone(),
			f.source_id => info.source_id.clone(),
			f.source_type => i64::from(info.source_type.as_i32()),
			f.knowledge_id => info.knowledge_id.clone(),
			f.knowledge_base_id => info.knowledge_base_id.clone(),
		)
	}

	fn to_info(&self, doc: &TantivyDocument) -> Result<IndexInfo> {
		let f = &self.fields;
		let raw_type = doc.get_first(f.source_type).and_then(|v| v.as_i64()).ok_or_else(|| Error::Decode("stored field 'source_type' missing".into()))?;
		let source_type = i32::try_from(raw_type)
			.ok()
			.and_then(SourceType::from_i32)
			.ok_or_else(|| Error::Decode(format!("unknown source_type {}", raw_type)))?;
		Ok(IndexInfo {
			chunk_id: stored_str(doc, f.chunk_id, "chunk_id")?,
			content: stored_str(doc, f.content, "content")?,
			source_id: stored_str(doc, f.source_id, "source_id")?,
			source_type,
			knowledge_id: stored_str(doc, f.knowledge_id, "knowledge_id")?,
			knowledge_base_id: stored_str(doc, f.knowledge_base_id, "knowledge_base_id")?,
		})
	}

	/// `Should` over one term per id; `None` when `ids` is empty.
	fn any_of(&self, field: Field, ids: &[String]) -> Option<Box<dyn Query>> {
		if ids.is_empty() {
			return None;
		}
		let clauses = ids
			.iter()
			.map(|id| (Occur::Should, Box::new(TermQuery::new(self.term(field, id), IndexRecordOption::Basic)) as Box<dyn Query>))
			.collect();
		Some(Box::new(BooleanQuery::new(clauses)))
	}

	fn keyword_query(&self, params: &RetrieveParams) -> Box<dyn Query> {
		let parser = QueryParser::for_index(&self.index, vec![self.fields.content]);
		let (query, errors) = parser.parse_query_lenient(&params.query);
		if !errors.is_empty() {
			debug!(errors = errors.len(), "query parsed leniently");
		}
		match self.any_of(self.fields.knowledge_base_id, &params.knowledge_base_ids) {
			// The filter restricts without adding to the BM25 score.
			Some(filter) => Box::new(BooleanQuery::new(vec![(Occur::Must, query), (Occur::Must, Box::new(ConstScoreQuery::new(filter, 0.0)))])),
			None => query,
		}
	}

	pub fn keywords_retrieve(&self, params: &RetrieveParams) -> Result<Vec<IndexWithScore>> {
		if params.top_k == 0 {
			return Err(Error::InvalidInput("top_k must be positive".into()));
		}
		if params.query.trim().is_empty() {
			return Err(Error::InvalidInput("keyword query is empty".into()));
		}
		let query = self.keyword_query(params);
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&*query, &TopDocs::with_limit(params.top_k)).map_err(|e| {
			error!(error = %e, "keywords retrieval failed");
			Error::backend(e)
		})?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(Error::backend)?;
			let info = self.to_info(&doc)?;
			hits.push(IndexWithScore {
				chunk_id: info.chunk_id,
				content: info.content,
				source_id: info.source_id,
				source_type: info.source_type,
				knowledge_id: info.knowledge_id,
				knowledge_base_id: info.knowledge_base_id,
				score: f64::from(score),
				match_type: MatchType::Keywords,
			});
		}
		info!(found = hits.len(), "keywords retrieval");
		Ok(hits)
	}

	/// Replaces any document sharing a `chunk_id`, then commits.
	fn write(&self, infos: &[IndexInfo]) -> Result<usize> {
		if infos.is_empty() {
			return Ok(0);
		}
		let mut writer = self.writer.lock();
		for info in infos {
			writer.delete_term(self.term(self.fields.chunk_id, &info.chunk_id));
			writer.add_document(self.to_document(info)).map_err(Error::backend)?;
		}
		self.commit(&mut writer)?;
		Ok(infos.len())
	}

	fn delete_terms(&self, field: Field, ids: &[String]) -> Result<()> {
		if ids.is_empty() {
			return Ok(());
		}
		let mut writer = self.writer.lock();
		for id in ids {
			writer.delete_term(self.term(field, id));
		}
		self.commit(&mut writer)
	}

	/// Blocking: flushes segments to the directory before returning.
	fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
		writer.commit().map_err(|e| {
			error!(error = %e, "text index commit failed");
			Error::backend(e)
		})?;
		self.reader.reload().map_err(Error::backend)
	}

	/// Copies from one searcher snapshot, so records written by the copy
	/// itself are never read back as source.
	fn copy_snapshot(&self, request: &CopyIndicesRequest) -> Result<u64> {
		let searcher = self.reader.searcher();
		let source = TermQuery::new(self.term(self.fields.knowledge_base_id, &request.source_knowledge_base_id), IndexRecordOption::Basic);
		let mut addresses: Vec<DocAddress> = searcher.search(&source, &DocSetCollector).map_err(Error::backend)?.into_iter().collect();
		addresses.sort_unstable();
		if addresses.is_empty() {
			warn!(source = %request.source_knowledge_base_id, "no source records found");
			return Ok(0);
		}
		let mut total = 0u64;
		for page in addresses.chunks(self.copy_batch_size) {
			let mut infos = Vec::with_capacity(page.len());
			for addr in page {
				let doc: TantivyDocument = searcher.doc(*addr).map_err(Error::backend)?;
				let info = self.to_info(&doc)?;
				let Some((chunk_id, knowledge_id)) = request.target_ids(&info.chunk_id, &info.knowledge_id) else {
					warn!(chunk_id = %info.chunk_id, knowledge_id = %info.knowledge_id, "source record has no target mapping, skipping");
					continue;
				};
				infos.push(IndexInfo {
					chunk_id: chunk_id.to_string(),
					knowledge_id: knowledge_id.to_string(),
					knowledge_base_id: request.target_knowledge_base_id.clone(),
					..info
				});
			}
			let written = self.write(&infos)?;
			total += written as u64;
			debug!(fetched = page.len(), written, total, "copied page");
		}
		Ok(total)
	}
}

fn stored_str(doc: &TantivyDocument, field: Field, name: &str) -> Result<String> {
	doc.get_first(field)
		.and_then(|v| v.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::Decode(format!("stored field '{}' missing", name)))
}

#[async_trait]
impl RetrieveEngine for TextRetrieveEngine {
	fn engine_type(&self) -> EngineType {
		EngineType::Tantivy
	}

	fn support(&self) -> Vec<RetrieverType> {
		vec![RetrieverType::Keywords]
	}

	async fn retrieve(&self, params: &RetrieveParams) -> Result<Vec<RetrieveResult>> {
		debug!(retriever = %params.retriever_type, top_k = params.top_k, "processing retrieval");
		if params.retriever_type != RetrieverType::Keywords {
			error!(retriever = %params.retriever_type, "invalid retriever type");
			return Err(Error::InvalidRetrieverType(params.retriever_type));
		}
		let hits = self.keywords_retrieve(params)?;
		Ok(vec![RetrieveResult::ok(EngineType::Tantivy, RetrieverType::Keywords, hits)])
	}

	async fn save(&self, info: &IndexInfo, _params: &SaveParams) -> Result<()> {
		debug!(chunk_id = %info.chunk_id, "saving index");
		self.write(std::slice::from_ref(info))?;
		Ok(())
	}

	async fn batch_save(&self, infos: &[IndexInfo], _params: &SaveParams) -> Result<()> {
		let written = self.write(infos)?;
		info!(written, "batch saved documents");
		Ok(())
	}

	async fn delete_by_chunk_ids(&self, chunk_ids: &[String], _dimension: usize) -> Result<()> {
		debug!(count = chunk_ids.len(), "deleting by chunk ids");
		self.delete_terms(self.fields.chunk_id, chunk_ids)
	}

	async fn delete_by_knowledge_ids(&self, knowledge_ids: &[String], _dimension: usize) -> Result<()> {
		debug!(count = knowledge_ids.len(), "deleting by knowledge ids");
		self.delete_terms(self.fields.knowledge_id, knowledge_ids)
	}

	fn estimate_storage_size(&self, infos: &[IndexInfo], _params: &SaveParams) -> u64 {
		infos.iter().map(|i| i.content.len() as u64 + METADATA_OVERHEAD_BYTES).sum()
	}

	async fn copy_indices(&self, request: &CopyIndicesRequest) -> Result<u64> {
		if request.chunk_id_map.is_empty() {
			warn!(source = %request.source_knowledge_base_id, "chunk id mapping is empty, nothing to copy");
			return Ok(0);
		}
		let total = self.copy_snapshot(request)?;
		info!(source = %request.source_knowledge_base_id, target = %request.target_knowledge_base_id, total, "index copy completed");
		Ok(total)
	}
}
