//! Domain types shared by the retrieve engines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Provenance of an indexed chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceType {
    Chunk,
    Passage,
    Summary,
}

impl SourceType {
    pub fn as_i32(self) -> i32 {
        match self {
            SourceType::Chunk => 0,
            SourceType::Passage => 1,
            SourceType::Summary => 2,
        }
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(SourceType::Chunk),
            1 => Some(SourceType::Passage),
            2 => Some(SourceType::Summary),
            _ => None,
        }
    }
}

/// Query modes an engine may serve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverType {
    Keywords,
    Vector,
    Graph,
}

impl fmt::Display for RetrieverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetrieverType::Keywords => "keywords",
            RetrieverType::Vector => "vector",
            RetrieverType::Graph => "graph",
        };
        f.write_str(s)
    }
}

/// Identifies the concrete backend behind a `RetrieveEngine`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Lance,
    Tantivy,
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineType::Lance => f.write_str("lance"),
            EngineType::Tantivy => f.write_str("tantivy"),
        }
    }
}

/// Which scoring path produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Embedding,
    Keywords,
}

/// A chunk as handed to an engine for indexing. The embedding travels
/// separately in `SaveParams`, keyed by `source_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub chunk_id: String,
    pub content: String,
    pub source_id: String,
    pub source_type: SourceType,
    pub knowledge_id: String,
    pub knowledge_base_id: String,
}

/// One embedded chunk as stored by a vector backend.
///
/// `chunk_id` is the primary key. `knowledge_base_id` and `knowledge_id` are
/// never rewritten in place; replication writes new records instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub knowledge_base_id: String,
    pub knowledge_id: String,
}

/// Extra inputs for `save`/`batch_save`/`estimate_storage_size`.
#[derive(Debug, Clone, Default)]
pub struct SaveParams {
    /// Embeddings keyed by `IndexInfo::source_id`.
    pub embeddings: HashMap<String, Vec<f32>>,
}

impl SaveParams {
    pub fn with_embedding(mut self, source_id: impl Into<String>, vector: Vec<f32>) -> Self {
        self.embeddings.insert(source_id.into(), vector);
        self
    }

    pub fn embedding_for(&self, source_id: &str) -> Option<&[f32]> {
        self.embeddings.get(source_id).map(Vec::as_slice)
    }
}

/// A single ranked hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexWithScore {
    pub chunk_id: String,
    pub content: String,
    pub source_id: String,
    pub source_type: SourceType,
    pub knowledge_id: String,
    pub knowledge_base_id: String,
    pub score: f64,
    pub match_type: MatchType,
}

/// Query handed to `RetrieveEngine::retrieve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveParams {
    pub retriever_type: RetrieverType,
    pub query: String,
    pub embedding: Vec<f32>,
    pub top_k: usize,
    /// Empty means the whole collection.
    pub knowledge_base_ids: Vec<String>,
}

impl RetrieveParams {
    pub fn keywords(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            retriever_type: RetrieverType::Keywords,
            query: query.into(),
            embedding: Vec::new(),
            top_k,
            knowledge_base_ids: Vec::new(),
        }
    }

    pub fn vector(embedding: Vec<f32>, top_k: usize) -> Self {
        Self {
            retriever_type: RetrieverType::Vector,
            query: String::new(),
            embedding,
            top_k,
            knowledge_base_ids: Vec::new(),
        }
    }

    pub fn with_knowledge_base_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.knowledge_base_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// One engine's answer to one query. `error` is set when the engine failed;
/// sibling results from other engines are unaffected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResult {
    pub results: Vec<IndexWithScore>,
    pub engine_type: EngineType,
    pub retriever_type: RetrieverType,
    pub error: Option<String>,
}

impl RetrieveResult {
    pub fn ok(engine_type: EngineType, retriever_type: RetrieverType, results: Vec<IndexWithScore>) -> Self {
        Self { results, engine_type, retriever_type, error: None }
    }

    pub fn failed(engine_type: EngineType, retriever_type: RetrieverType, error: impl fmt::Display) -> Self {
        Self { results: Vec::new(), engine_type, retriever_type, error: Some(error.to_string()) }
    }
}

/// Inputs of a cross-knowledge-base copy.
///
/// `knowledge_id_map` maps source document ids to target document ids and
/// `chunk_id_map` maps source chunk ids to target chunk ids. Source records
/// whose chunk or knowledge id has no mapping are skipped.
#[derive(Debug, Clone, Default)]
pub struct CopyIndicesRequest {
    pub source_knowledge_base_id: String,
    pub knowledge_id_map: HashMap<String, String>,
    pub chunk_id_map: HashMap<String, String>,
    pub target_knowledge_base_id: String,
    pub dimension: usize,
}

impl CopyIndicesRequest {
    /// Target `(chunk_id, knowledge_id)` for a source record, or `None` when
    /// either id has no mapping.
    pub fn target_ids(&self, chunk_id: &str, knowledge_id: &str) -> Option<(&str, &str)> {
        let chunk = self.chunk_id_map.get(chunk_id)?;
        let knowledge = self.knowledge_id_map.get(knowledge_id)?;
        Some((chunk.as_str(), knowledge.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_round_trips_through_i32() {
        for st in [SourceType::Chunk, SourceType::Passage, SourceType::Summary] {
            assert_eq!(SourceType::from_i32(st.as_i32()), Some(st));
        }
        assert_eq!(SourceType::from_i32(42), None);
    }

    #[test]
    fn retrieve_params_builders_set_mode() {
        let p = RetrieveParams::keywords("storm", 5).with_knowledge_base_ids(["kb1", "kb2"]);
        assert_eq!(p.retriever_type, RetrieverType::Keywords);
        assert_eq!(p.knowledge_base_ids, vec!["kb1".to_string(), "kb2".to_string()]);
        let v = RetrieveParams::vector(vec![0.1, 0.2], 3);
        assert_eq!(v.retriever_type, RetrieverType::Vector);
        assert!(v.knowledge_base_ids.is_empty());
    }

    #[test]
    fn copy_request_requires_both_mappings() {
        let req = CopyIndicesRequest {
            knowledge_id_map: HashMap::from([("k1".to_string(), "t1".to_string())]),
            chunk_id_map: HashMap::from([("c1".to_string(), "n1".to_string())]),
            ..CopyIndicesRequest::default()
        };
        assert_eq!(req.target_ids("c1", "k1"), Some(("n1", "t1")));
        assert_eq!(req.target_ids("c1", "k2"), None);
        assert_eq!(req.target_ids("c2", "k1"), None);
    }
}
