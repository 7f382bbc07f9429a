//! Capacity-planning estimate for would-be index records.
//!
//! Per record: content bytes + 4 bytes per dimension + a fixed metadata
//! overhead + an HNSW-style index overhead of twice the raw vector bytes.
//! Pure function of input sizes; never touches the backend.

use kbsearch_core::types::{IndexInfo, SaveParams};

pub const METADATA_OVERHEAD_BYTES: u64 = 200;
pub const INDEX_OVERHEAD_FACTOR: u64 = 2;
const BYTES_PER_DIMENSION: u64 = 4;

pub fn estimate_record_size(content_bytes: usize, dimension: usize) -> u64 {
    let vector_bytes = dimension as u64 * BYTES_PER_DIMENSION;
    content_bytes as u64 + vector_bytes + METADATA_OVERHEAD_BYTES + vector_bytes * INDEX_OVERHEAD_FACTOR
}

/// Records without an embedding in `params` are counted with zero dimensions.
pub fn estimate_storage_size(infos: &[IndexInfo], params: &SaveParams) -> u64 {
    infos
        .iter()
        .map(|info| {
            let dim = params.embedding_for(&info.source_id).map_or(0, <[f32]>::len);
            estimate_record_size(info.content.len(), dim)
        })
        .sum()
}
