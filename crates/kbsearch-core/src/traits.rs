use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CopyIndicesRequest, EngineType, IndexInfo, RetrieveParams, RetrieveResult, RetrieverType, SaveParams};

/// A search backend able to serve some subset of query modes.
///
/// Callers consult `support()` and must not send a mode the engine does not
/// declare; doing so fails with `Error::InvalidRetrieverType`.
#[async_trait]
pub trait RetrieveEngine: Send + Sync {
    fn engine_type(&self) -> EngineType;

    fn support(&self) -> Vec<RetrieverType>;

    fn supports(&self, retriever_type: RetrieverType) -> bool {
        self.support().contains(&retriever_type)
    }

    async fn retrieve(&self, params: &RetrieveParams) -> Result<Vec<RetrieveResult>>;

    async fn save(&self, info: &IndexInfo, params: &SaveParams) -> Result<()>;

    async fn batch_save(&self, infos: &[IndexInfo], params: &SaveParams) -> Result<()>;

    /// Idempotent: absent ids are not an error.
    async fn delete_by_chunk_ids(&self, chunk_ids: &[String], dimension: usize) -> Result<()>;

    /// Idempotent: absent ids are not an error.
    async fn delete_by_knowledge_ids(&self, knowledge_ids: &[String], dimension: usize) -> Result<()>;

    /// Capacity-planning estimate in bytes. Pure; never touches the backend.
    fn estimate_storage_size(&self, infos: &[IndexInfo], params: &SaveParams) -> u64;

    /// Copies every record of the source knowledge base into the target one,
    /// remapping ids. Returns the number of records written.
    ///
    /// Not atomic: a failure part-way leaves earlier pages in place.
    async fn copy_indices(&self, request: &CopyIndicesRequest) -> Result<u64>;
}
