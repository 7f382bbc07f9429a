//! LanceDB-backed `RetrieveEngine`.
//!
//! The engine serves one active collection at a time. The active collection
//! sits behind a lock holding an `Arc`; requests clone the `Arc` and release
//! the lock immediately, while `set_collection_dimension` builds and loads
//! the new collection before swapping it in with a single write.

use async_trait::async_trait;
use lancedb::{Connection, Table};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use kbsearch_core::config::RetrievalSettings;
use kbsearch_core::error::{Error, Result};
use kbsearch_core::traits::RetrieveEngine;
use kbsearch_core::types::{
    CopyIndicesRequest, EngineType, IndexInfo, IndexRecord, RetrieveParams, RetrieveResult, RetrieverType, SaveParams,
};

use crate::copy::{self, DEFAULT_COPY_BATCH_SIZE};
use crate::schema::{collection_name, CHUNK_ID, DEFAULT_DIMENSION, KNOWLEDGE_ID};
use crate::search::{id_filter, keyword_search, vector_search};
use crate::storage;
use crate::table::{collection_exists, ensure_collection, ensure_indexes, load_collection, open_db};
use crate::writer::{record_from_index_info, upsert_records};

#[derive(Debug, Clone, PartialEq)]
pub struct VectorEngineSettings {
    pub default_dimension: usize,
    /// Fraction of query terms that may be dropped from keyword queries.
    pub keyword_drop_ratio: f32,
    pub copy_batch_size: usize,
    pub vector_index_min_rows: usize,
}

impl Default for VectorEngineSettings {
    fn default() -> Self {
        Self {
            default_dimension: DEFAULT_DIMENSION,
            keyword_drop_ratio: 0.1,
            copy_batch_size: DEFAULT_COPY_BATCH_SIZE,
            vector_index_min_rows: 256,
        }
    }
}

impl From<&RetrievalSettings> for VectorEngineSettings {
    fn from(s: &RetrievalSettings) -> Self {
        Self {
            default_dimension: s.default_dimension,
            keyword_drop_ratio: s.keyword_drop_ratio,
            copy_batch_size: s.copy_batch_size,
            vector_index_min_rows: s.vector_index_min_rows,
        }
    }
}

struct ActiveCollection {
    name: String,
    dimension: usize,
    table: Table,
    text_index_ready: AtomicBool,
}

pub struct VectorRetrieveEngine {
    conn: Connection,
    settings: VectorEngineSettings,
    active: RwLock<Arc<ActiveCollection>>,
}

impl VectorRetrieveEngine {
    pub async fn connect(uri: &str, settings: VectorEngineSettings) -> Result<Self> {
        let conn = open_db(uri).await?;
        Self::new(conn, settings).await
    }

    pub async fn from_settings(settings: &RetrievalSettings) -> Result<Self> {
        let uri = settings.lancedb_path();
        Self::connect(&uri.to_string_lossy(), VectorEngineSettings::from(settings)).await
    }

    /// Ensures and loads the collection for `settings.default_dimension`.
    pub async fn new(conn: Connection, settings: VectorEngineSettings) -> Result<Self> {
        let active = activate(&conn, settings.default_dimension, settings.vector_index_min_rows).await?;
        Ok(Self { conn, settings, active: RwLock::new(Arc::new(active)) })
    }

    /// Switches subsequent operations to the collection for `dim`, creating
    /// and loading it first. The previous collection stays active if this fails.
    pub async fn set_collection_dimension(&self, dim: usize) -> Result<()> {
        if dim == 0 {
            return Err(Error::InvalidInput("dimension must be positive".into()));
        }
        let next = activate(&self.conn, dim, self.settings.vector_index_min_rows).await?;
        let name = next.name.clone();
        *self.active.write() = Arc::new(next);
        info!(collection = %name, "active collection switched");
        Ok(())
    }

    pub fn collection_name(&self) -> String {
        self.active.read().name.clone()
    }

    pub fn dimension(&self) -> usize {
        self.active.read().dimension
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn current(&self) -> Arc<ActiveCollection> {
        Arc::clone(&self.active.read())
    }

    /// Builds any index the active collection is still missing.
    pub async fn refresh_indexes(&self) -> Result<()> {
        let active = self.current();
        let state = ensure_indexes(&active.table, self.settings.vector_index_min_rows).await?;
        active.text_index_ready.store(state.text, Ordering::Release);
        Ok(())
    }

    async fn ensure_text_index(&self, active: &ActiveCollection) -> Result<bool> {
        if active.text_index_ready.load(Ordering::Acquire) {
            return Ok(true);
        }
        let state = ensure_indexes(&active.table, self.settings.vector_index_min_rows).await?;
        active.text_index_ready.store(state.text, Ordering::Release);
        Ok(state.text)
    }

    /// Table for `dimension`; `0` or the active dimension means the active
    /// collection. `None` when no collection exists for that dimension.
    async fn table_for(&self, dimension: usize) -> Result<Option<Table>> {
        let active = self.current();
        if dimension == 0 || dimension == active.dimension {
            return Ok(Some(active.table.clone()));
        }
        let name = collection_name(dimension);
        if !collection_exists(&self.conn, &name).await? {
            return Ok(None);
        }
        load_collection(&self.conn, &name).await.map(Some)
    }

    pub async fn keywords_retrieve(&self, params: &RetrieveParams) -> Result<Vec<RetrieveResult>> {
        if params.query.trim().is_empty() {
            return Err(Error::InvalidInput("keyword query is empty".into()));
        }
        let active = self.current();
        if !self.ensure_text_index(&active).await? {
            debug!(collection = %active.name, "collection is empty, no keyword matches");
            return Ok(vec![RetrieveResult::ok(EngineType::Lance, RetrieverType::Keywords, Vec::new())]);
        }
        let hits = keyword_search(&active.table, params, self.settings.keyword_drop_ratio)
            .await
            .map_err(|e| {
                error!(collection = %active.name, error = %e, "keywords retrieval failed");
                e
            })?;
        info!(collection = %active.name, found = hits.len(), "keywords retrieval");
        Ok(vec![RetrieveResult::ok(EngineType::Lance, RetrieverType::Keywords, hits)])
    }

    pub async fn vector_retrieve(&self, params: &RetrieveParams) -> Result<Vec<RetrieveResult>> {
        if params.embedding.is_empty() {
            return Err(Error::InvalidInput("query embedding is empty".into()));
        }
        let active = self.current();
        let hits = vector_search(&active.table, params).await.map_err(|e| {
            error!(collection = %active.name, error = %e, "vector retrieval failed");
            e
        })?;
        info!(collection = %active.name, found = hits.len(), "vector retrieval");
        Ok(vec![RetrieveResult::ok(EngineType::Lance, RetrieverType::Vector, hits)])
    }

    async fn write(&self, records: &[IndexRecord]) -> Result<u64> {
        let active = self.current();
        let written = upsert_records(&active.table, records).await?;
        let built = self.ensure_text_index(&active).await;
        settle_index_build(&active.name, written, built);
        Ok(written)
    }

    async fn delete_where(&self, column: &str, ids: &[String], dimension: usize) -> Result<()> {
        let Some(filter) = id_filter(column, ids) else {
            return Ok(());
        };
        let Some(table) = self.table_for(dimension).await? else {
            debug!(dimension, "no collection for dimension, nothing to delete");
            return Ok(());
        };
        table.delete(&filter).await.map_err(|e| {
            error!(table = %table.name(), column, error = %e, "delete failed");
            Error::backend(e)
        })?;
        info!(table = %table.name(), column, ids = ids.len(), "deleted by id list");
        Ok(())
    }
}

/// The rows are committed by the time the index build runs, so a failed
/// build is logged and left for `keywords_retrieve` to retry. Returns whether
/// the text index is ready.
fn settle_index_build(collection: &str, written: u64, built: Result<bool>) -> bool {
    match built {
        Ok(ready) => ready,
        Err(e) => {
            warn!(collection, written, error = %e, "rows written but text index build failed, will retry on search");
            false
        }
    }
}

async fn activate(conn: &Connection, dim: usize, vector_index_min_rows: usize) -> Result<ActiveCollection> {
    let name = ensure_collection(conn, dim).await?;
    let table = load_collection(conn, &name).await?;
    let state = ensure_indexes(&table, vector_index_min_rows).await?;
    Ok(ActiveCollection { name, dimension: dim, table, text_index_ready: AtomicBool::new(state.text) })
}

#[async_trait]
impl RetrieveEngine for VectorRetrieveEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Lance
    }

    fn support(&self) -> Vec<RetrieverType> {
        vec![RetrieverType::Keywords, RetrieverType::Vector]
    }

    async fn retrieve(&self, params: &RetrieveParams) -> Result<Vec<RetrieveResult>> {
        debug!(retriever = %params.retriever_type, top_k = params.top_k, "processing retrieval");
        if params.top_k == 0 {
            return Err(Error::InvalidInput("top_k must be positive".into()));
        }
        match params.retriever_type {
            RetrieverType::Keywords => self.keywords_retrieve(params).await,
            RetrieverType::Vector => self.vector_retrieve(params).await,
            other => {
                error!(retriever = %other, "invalid retriever type");
                Err(Error::InvalidRetrieverType(other))
            }
        }
    }

    async fn save(&self, info: &IndexInfo, params: &SaveParams) -> Result<()> {
        debug!(chunk_id = %info.chunk_id, "saving index");
        let record = record_from_index_info(info, params)?;
        let written = self.write(std::slice::from_ref(&record)).await?;
        info!(written, "saved vectors");
        Ok(())
    }

    async fn batch_save(&self, infos: &[IndexInfo], params: &SaveParams) -> Result<()> {
        debug!(count = infos.len(), "batch saving indexes");
        if infos.is_empty() {
            return Ok(());
        }
        let records = infos.iter().map(|i| record_from_index_info(i, params)).collect::<Result<Vec<_>>>()?;
        let written = self.write(&records).await?;
        info!(written, "batch saved vectors");
        Ok(())
    }

    async fn delete_by_chunk_ids(&self, chunk_ids: &[String], dimension: usize) -> Result<()> {
        debug!(count = chunk_ids.len(), "deleting by chunk ids");
        self.delete_where(CHUNK_ID, chunk_ids, dimension).await
    }

    async fn delete_by_knowledge_ids(&self, knowledge_ids: &[String], dimension: usize) -> Result<()> {
        debug!(count = knowledge_ids.len(), "deleting by knowledge ids");
        self.delete_where(KNOWLEDGE_ID, knowledge_ids, dimension).await
    }

    fn estimate_storage_size(&self, infos: &[IndexInfo], params: &SaveParams) -> u64 {
        let total = storage::estimate_storage_size(infos, params);
        info!(count = infos.len(), bytes = total, "estimated storage size");
        total
    }

    async fn copy_indices(&self, request: &CopyIndicesRequest) -> Result<u64> {
        if request.chunk_id_map.is_empty() {
            warn!(source = %request.source_knowledge_base_id, "chunk id mapping is empty, nothing to copy");
            return Ok(0);
        }
        let Some(table) = self.table_for(request.dimension).await? else {
            warn!(dimension = request.dimension, "no collection for dimension, nothing to copy");
            return Ok(0);
        };
        copy::copy_indices(&table, request, self.settings.copy_batch_size).await
    }
}
