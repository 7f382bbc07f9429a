use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray};
use futures::{TryStream, TryStreamExt};
use lancedb::index::scalar::FullTextSearchQuery;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};
use std::collections::HashMap;

use kbsearch_core::error::{Error, Result};
use kbsearch_core::types::{IndexRecord, IndexWithScore, MatchType, RetrieveParams, SourceType};

use crate::schema::{CHUNK_ID, CONTENT, KNOWLEDGE_BASE_ID, KNOWLEDGE_ID, OUTPUT_COLUMNS, SOURCE_ID, SOURCE_TYPE, VECTOR};

const DISTANCE_COL: &str = "_distance";
const SCORE_COL: &str = "_score";

pub(crate) fn quote(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

/// `column IN ('a', 'b')`, or `None` when `ids` is empty (no restriction).
pub fn id_filter(column: &str, ids: &[String]) -> Option<String> {
	if ids.is_empty() {
		return None;
	}
	let quoted = ids.iter().map(|id| quote(id)).collect::<Vec<_>>().join(", ");
	Some(format!("{} IN ({})", column, quoted))
}

/// Drops the lowest-weighted `floor(n * drop_ratio)` of the query's `n`
/// distinct terms, weight being the term's frequency within the query.
/// Ties keep the earlier term. Surviving terms keep their query order.
pub fn prune_query_terms(query: &str, drop_ratio: f32) -> String {
	let mut order: Vec<String> = Vec::new();
	let mut counts: HashMap<String, usize> = HashMap::new();
	for term in query.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
		let term = term.to_lowercase();
		let count = counts.entry(term.clone()).or_insert(0);
		if *count == 0 {
			order.push(term);
		}
		*count += 1;
	}
	let drop = (order.len() as f32 * drop_ratio.clamp(0.0, 1.0)).floor() as usize;
	if drop == 0 {
		return query.trim().to_string();
	}
	let mut ranked: Vec<usize> = (0..order.len()).collect();
	ranked.sort_by(|&a, &b| counts[&order[b]].cmp(&counts[&order[a]]).then(a.cmp(&b)));
	ranked.truncate(order.len() - drop);
	ranked.sort_unstable();
	ranked.into_iter().map(|i| order[i].as_str()).collect::<Vec<_>>().join(" ")
}

pub async fn keyword_search(table: &Table, params: &RetrieveParams, drop_ratio: f32) -> Result<Vec<IndexWithScore>> {
	let text = prune_query_terms(&params.query, drop_ratio);
	let mut query = table
		.query()
		.full_text_search(FullTextSearchQuery::new(text))
		.select(Select::columns(&OUTPUT_COLUMNS))
		.limit(params.top_k);
	if let Some(filter) = id_filter(KNOWLEDGE_BASE_ID, &params.knowledge_base_ids) {
		query = query.only_if(filter);
	}
	let stream = query.execute().await.map_err(Error::backend)?;
	collect_hits(stream, MatchType::Keywords).await
}

pub async fn vector_search(table: &Table, params: &RetrieveParams) -> Result<Vec<IndexWithScore>> {
	let mut query = table
		.vector_search(params.embedding.clone())
		.map_err(Error::backend)?
		.column(VECTOR)
		.distance_type(DistanceType::Dot)
		.select(Select::columns(&OUTPUT_COLUMNS))
		.limit(params.top_k);
	if let Some(filter) = id_filter(KNOWLEDGE_BASE_ID, &params.knowledge_base_ids) {
		query = query.only_if(filter);
	}
	let stream = query.execute().await.map_err(Error::backend)?;
	collect_hits(stream, MatchType::Embedding).await
}

async fn collect_hits<S>(mut stream: S, match_type: MatchType) -> Result<Vec<IndexWithScore>>
where
	S: TryStream<Ok = RecordBatch> + Unpin,
	S::Error: std::error::Error + Send + Sync + 'static,
{
	let mut hits = Vec::new();
	while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
		hits.extend(batch_to_hits(&batch, match_type)?);
	}
	hits.sort_by(|a, b| b.score.total_cmp(&a.score));
	Ok(hits)
}

pub(crate) fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::Decode(format!("column '{}' missing or mistyped", name)))
}

fn source_type_at(col: &Int32Array, i: usize) -> Result<SourceType> {
	let raw = col.value(i);
	SourceType::from_i32(raw).ok_or_else(|| Error::Decode(format!("unknown source_type {}", raw)))
}

/// Vector hits carry a dot distance (`1 - ip`); keyword hits carry a BM25
/// score. Both are turned into "higher is better".
pub fn batch_to_hits(batch: &RecordBatch, match_type: MatchType) -> Result<Vec<IndexWithScore>> {
	let chunk_ids = column::<StringArray>(batch, CHUNK_ID)?;
	let contents = column::<StringArray>(batch, CONTENT)?;
	let source_types = column::<Int32Array>(batch, SOURCE_TYPE)?;
	let source_ids = column::<StringArray>(batch, SOURCE_ID)?;
	let kb_ids = column::<StringArray>(batch, KNOWLEDGE_BASE_ID)?;
	let knowledge_ids = column::<StringArray>(batch, KNOWLEDGE_ID)?;
	let scores = match match_type {
		MatchType::Embedding => column::<Float32Array>(batch, DISTANCE_COL)?,
		MatchType::Keywords => column::<Float32Array>(batch, SCORE_COL)?,
	};
	let mut hits = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let raw = f64::from(scores.value(i));
		let score = match match_type {
			MatchType::Embedding => 1.0 - raw,
			MatchType::Keywords => raw,
		};
		hits.push(IndexWithScore {
			chunk_id: chunk_ids.value(i).to_string(),
			content: contents.value(i).to_string(),
			source_id: source_ids.value(i).to_string(),
			source_type: source_type_at(source_types, i)?,
			knowledge_id: knowledge_ids.value(i).to_string(),
			knowledge_base_id: kb_ids.value(i).to_string(),
			score,
			match_type,
		});
	}
	Ok(hits)
}

/// Full records, vectors included. Used when reading pages for replication.
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<IndexRecord>> {
	let chunk_ids = column::<StringArray>(batch, CHUNK_ID)?;
	let vectors = column::<FixedSizeListArray>(batch, VECTOR)?;
	let contents = column::<StringArray>(batch, CONTENT)?;
	let source_types = column::<Int32Array>(batch, SOURCE_TYPE)?;
	let source_ids = column::<StringArray>(batch, SOURCE_ID)?;
	let kb_ids = column::<StringArray>(batch, KNOWLEDGE_BASE_ID)?;
	let knowledge_ids = column::<StringArray>(batch, KNOWLEDGE_ID)?;
	let mut records = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let list = vectors.value(i);
		let values = list
			.as_any()
			.downcast_ref::<Float32Array>()
			.ok_or_else(|| Error::Decode("vector values are not float32".into()))?;
		records.push(IndexRecord {
			chunk_id: chunk_ids.value(i).to_string(),
			vector: values.values().to_vec(),
			content: contents.value(i).to_string(),
			source_type: source_type_at(source_types, i)?,
			source_id: source_ids.value(i).to_string(),
			knowledge_base_id: kb_ids.value(i).to_string(),
			knowledge_id: knowledge_ids.value(i).to_string(),
		});
	}
	Ok(records)
}
