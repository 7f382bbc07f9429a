//! LanceDB connection and collection lifecycle helpers.
//!
//! A collection is one table per embedding dimensionality. `ensure_collection`
//! is check-then-create and tolerates a concurrent creator; `load_collection`
//! opens the table and makes sure its indexes exist before it is served.

use arrow_array::{RecordBatch, RecordBatchIterator};
use arrow_schema::ArrowError;
use lancedb::index::scalar::FtsIndexBuilder;
use lancedb::index::vector::IvfHnswSqIndexBuilder;
use lancedb::index::{Index, IndexConfig};
use lancedb::{connect, Connection, DistanceType, Table};
use tracing::{debug, error, info, warn};

use kbsearch_core::error::{Error, Result};

use crate::schema::{build_arrow_schema, collection_name, CONTENT, VECTOR};

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(Error::backend)
}

pub async fn collection_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(Error::backend)?;
    Ok(names.iter().any(|n| n == name))
}

/// Returns the collection name for `dim`, creating an empty collection when
/// none exists yet.
pub async fn ensure_collection(conn: &Connection, dim: usize) -> Result<String> {
    let name = collection_name(dim);
    if collection_exists(conn, &name).await? {
        return Ok(name);
    }
    let schema = build_arrow_schema(dim);
    let empty: Vec<std::result::Result<RecordBatch, ArrowError>> = Vec::new();
    let iter = RecordBatchIterator::new(empty.into_iter(), schema);
    let err = match conn.create_table(&name, Box::new(iter)).execute().await {
        Ok(_) => {
            info!(collection = %name, dim, "created collection");
            return Ok(name);
        }
        Err(err) => err,
    };
    // Lost a creation race: someone else made it between check and create.
    if collection_exists(conn, &name).await? {
        debug!(collection = %name, error = %err, "collection created concurrently");
        return Ok(name);
    }
    error!(collection = %name, error = %err, "failed to create collection");
    Err(Error::backend(err))
}

/// Opens a collection for serving.
pub async fn load_collection(conn: &Connection, name: &str) -> Result<Table> {
    let table = conn.open_table(name).execute().await.map_err(|e| {
        error!(collection = %name, error = %e, "failed to load collection");
        Error::backend(e)
    })?;
    debug!(collection = %name, "collection loaded");
    Ok(table)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexState {
    pub text: bool,
    pub vector: bool,
}

fn has_index_on(indices: &[IndexConfig], column: &str) -> bool {
    indices.iter().any(|idx| idx.columns.iter().any(|c| c == column))
}

/// Builds whichever of the full-text (BM25) and vector indexes is missing.
///
/// The full-text index needs at least one row; a failure to build it is an
/// error because keyword search cannot run without it. The vector index is
/// only trained once `vector_index_min_rows` rows exist, and a failed build
/// is logged and skipped since unindexed rows are still searched exhaustively.
pub async fn ensure_indexes(table: &Table, vector_index_min_rows: usize) -> Result<IndexState> {
    let indices = table.list_indices().await.map_err(Error::backend)?;
    let mut state = IndexState { text: has_index_on(&indices, CONTENT), vector: has_index_on(&indices, VECTOR) };
    if state.text && state.vector {
        return Ok(state);
    }
    let rows = table.count_rows(None).await.map_err(Error::backend)?;

    if !state.text && rows > 0 {
        table
            .create_index(&[CONTENT], Index::FTS(FtsIndexBuilder::default()))
            .execute()
            .await
            .map_err(|e| {
                error!(table = %table.name(), error = %e, "full-text index build failed");
                Error::backend(e)
            })?;
        info!(table = %table.name(), rows, "built full-text index");
        state.text = true;
    }

    if !state.vector && rows >= vector_index_min_rows.max(1) {
        let builder = IvfHnswSqIndexBuilder::default().distance_type(DistanceType::Dot);
        match table.create_index(&[VECTOR], Index::IvfHnswSq(builder)).execute().await {
            Ok(()) => {
                info!(table = %table.name(), rows, "built vector index");
                state.vector = true;
            }
            Err(e) => warn!(table = %table.name(), error = %e, "vector index build skipped"),
        }
    }
    Ok(state)
}
