use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Table;
use std::sync::Arc;
use tracing::{debug, error};

use kbsearch_core::error::{Error, Result};
use kbsearch_core::types::{IndexInfo, IndexRecord, SaveParams};

use crate::schema::{build_arrow_schema, CHUNK_ID, MAX_CONTENT_BYTES};

/// Pairs an `IndexInfo` with its embedding from `params`.
pub fn record_from_index_info(info: &IndexInfo, params: &SaveParams) -> Result<IndexRecord> {
	let vector = params
		.embedding_for(&info.source_id)
		.ok_or_else(|| Error::MissingEmbedding(info.source_id.clone()))?
		.to_vec();
	Ok(IndexRecord {
		chunk_id: info.chunk_id.clone(),
		vector,
		content: info.content.clone(),
		source_type: info.source_type,
		source_id: info.source_id.clone(),
		knowledge_base_id: info.knowledge_base_id.clone(),
		knowledge_id: info.knowledge_id.clone(),
	})
}

/// Column-oriented form of `records`. The batch dimensionality is taken from
/// the first record; whether it matches the target collection is left to the
/// backend.
pub fn records_to_batch(records: &[IndexRecord]) -> Result<RecordBatch> {
	let dim = records.first().map(|r| r.vector.len()).ok_or_else(|| Error::InvalidInput("no records to convert".into()))?;
	if dim == 0 {
		return Err(Error::InvalidInput("vectors must not be empty".into()));
	}
	let mut chunk_ids = Vec::with_capacity(records.len());
	let mut contents = Vec::with_capacity(records.len());
	let mut source_types = Vec::with_capacity(records.len());
	let mut source_ids = Vec::with_capacity(records.len());
	let mut kb_ids = Vec::with_capacity(records.len());
	let mut knowledge_ids = Vec::with_capacity(records.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
	for r in records {
		if r.vector.len() != dim {
			return Err(Error::InvalidInput(format!("chunk {} has {} dimensions, batch has {}", r.chunk_id, r.vector.len(), dim)));
		}
		if r.content.len() > MAX_CONTENT_BYTES {
			return Err(Error::InvalidInput(format!("chunk {} content is {} bytes, limit is {}", r.chunk_id, r.content.len(), MAX_CONTENT_BYTES)));
		}
		chunk_ids.push(r.chunk_id.as_str());
		contents.push(r.content.as_str());
		source_types.push(r.source_type.as_i32());
		source_ids.push(r.source_id.as_str());
		kb_ids.push(r.knowledge_base_id.as_str());
		knowledge_ids.push(r.knowledge_id.as_str());
		vectors.push(Some(r.vector.iter().map(|&x| Some(x)).collect()));
	}
	RecordBatch::try_new(build_arrow_schema(dim), vec![
		Arc::new(StringArray::from(chunk_ids)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim as i32)),
		Arc::new(StringArray::from(contents)),
		Arc::new(Int32Array::from(source_types)),
		Arc::new(StringArray::from(source_ids)),
		Arc::new(StringArray::from(kb_ids)),
		Arc::new(StringArray::from(knowledge_ids)),
	])
	.map_err(Error::backend)
}

/// Writes `records` as one merge-insert keyed by `chunk_id`, so an existing
/// chunk is overwritten rather than duplicated. Returns rows written.
pub async fn upsert_records(table: &Table, records: &[IndexRecord]) -> Result<u64> {
	if records.is_empty() {
		return Ok(0);
	}
	let batch = records_to_batch(records)?;
	let schema = batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
	let mut mi = table.merge_insert(&[CHUNK_ID]);
	mi.when_matched_update_all(None).when_not_matched_insert_all();
	let res = mi.execute(reader).await.map_err(|e| {
		error!(table = %table.name(), error = %e, "write failed");
		Error::backend(e)
	})?;
	let written = res.num_inserted_rows + res.num_updated_rows;
	debug!(table = %table.name(), inserted = res.num_inserted_rows, updated = res.num_updated_rows, "upserted records");
	Ok(written)
}
