//! Cross-knowledge-base replication.
//!
//! Source records are read in fixed-size pages by offset and written back
//! into the same collection with remapped ids. Paging is sequential so the
//! offset cursor stays meaningful. Writes are upserts keyed by `chunk_id`,
//! which makes a re-run overwrite instead of duplicate.
//!
//! The copy is not atomic: an error aborts the loop and pages already
//! written stay in place. Callers reconcile by re-running the copy.

use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use tracing::{error, info, warn};

use kbsearch_core::error::{Error, Result};
use kbsearch_core::types::{CopyIndicesRequest, IndexRecord};

use crate::schema::KNOWLEDGE_BASE_ID;
use crate::search::{batch_to_records, quote};
use crate::writer::upsert_records;

pub const DEFAULT_COPY_BATCH_SIZE: usize = 500;

/// Rewrites one source record for the target knowledge base, or `None` when
/// either its chunk id or its knowledge id has no target mapping.
pub fn remap_record(record: IndexRecord, request: &CopyIndicesRequest) -> Option<IndexRecord> {
    let Some((chunk_id, knowledge_id)) = request.target_ids(&record.chunk_id, &record.knowledge_id) else {
        warn!(chunk_id = %record.chunk_id, knowledge_id = %record.knowledge_id, "source record has no target mapping, skipping");
        return None;
    };
    Some(IndexRecord {
        chunk_id: chunk_id.to_string(),
        knowledge_id: knowledge_id.to_string(),
        knowledge_base_id: request.target_knowledge_base_id.clone(),
        ..record
    })
}

pub fn remap_page(page: Vec<IndexRecord>, request: &CopyIndicesRequest) -> Vec<IndexRecord> {
    page.into_iter().filter_map(|r| remap_record(r, request)).collect()
}

async fn read_page(table: &Table, filter: &str, offset: usize, batch_size: usize) -> Result<Vec<IndexRecord>> {
    let mut stream = table
        .query()
        .only_if(filter)
        .limit(batch_size)
        .offset(offset)
        .execute()
        .await
        .map_err(Error::backend)?;
    let mut page = Vec::new();
    while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
        page.extend(batch_to_records(&batch)?);
    }
    Ok(page)
}

/// Returns the number of records written to the target knowledge base.
pub async fn copy_indices(table: &Table, request: &CopyIndicesRequest, batch_size: usize) -> Result<u64> {
    info!(
        source = %request.source_knowledge_base_id,
        target = %request.target_knowledge_base_id,
        mappings = request.chunk_id_map.len(),
        "copying indices"
    );
    if request.chunk_id_map.is_empty() {
        warn!("chunk id mapping is empty, nothing to copy");
        return Ok(0);
    }
    let batch_size = batch_size.max(1);
    let filter = format!("{} = {}", KNOWLEDGE_BASE_ID, quote(&request.source_knowledge_base_id));
    let mut offset = 0usize;
    let mut total = 0u64;
    loop {
        let page = read_page(table, &filter, offset, batch_size).await.map_err(|e| {
            error!(offset, error = %e, "failed to read source page");
            e
        })?;
        let fetched = page.len();
        if fetched == 0 {
            if offset == 0 {
                warn!(source = %request.source_knowledge_base_id, "no source records found");
            }
            break;
        }
        let remapped = remap_page(page, request);
        let written = upsert_records(table, &remapped).await.map_err(|e| {
            error!(offset, error = %e, "failed to write copied page");
            e
        })?;
        total += written;
        info!(fetched, written, total, "copied page");
        offset += batch_size;
        if fetched < batch_size {
            break;
        }
    }
    info!(total, "index copy completed");
    Ok(total)
}
