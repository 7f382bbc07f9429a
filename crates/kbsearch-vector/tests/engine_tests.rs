use std::collections::HashMap;

use kbsearch_core::error::Error;
use kbsearch_core::traits::RetrieveEngine;
use kbsearch_core::types::{
    CopyIndicesRequest, IndexInfo, IndexWithScore, MatchType, RetrieveParams, RetrieverType, SaveParams, SourceType,
};
use kbsearch_vector::{VectorEngineSettings, VectorRetrieveEngine};
use tempfile::TempDir;

const DIM: usize = 4;

fn settings() -> VectorEngineSettings {
    VectorEngineSettings { default_dimension: DIM, copy_batch_size: 2, ..VectorEngineSettings::default() }
}

async fn engine(tmp: &TempDir) -> VectorRetrieveEngine {
    VectorRetrieveEngine::connect(&tmp.path().to_string_lossy(), settings()).await.expect("engine")
}

fn info(chunk: &str, knowledge: &str, kb: &str, content: &str) -> IndexInfo {
    IndexInfo {
        chunk_id: chunk.into(),
        content: content.into(),
        source_id: format!("src-{chunk}"),
        source_type: SourceType::Chunk,
        knowledge_id: knowledge.into(),
        knowledge_base_id: kb.into(),
    }
}

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

/// Four chunks in two knowledge bases, each pointing along its own axis.
async fn seed(engine: &VectorRetrieveEngine) {
    let infos = vec![
        info("c0", "k1", "kb1", "the lighthouse keeper trims the lamp"),
        info("c1", "k1", "kb1", "rainwater barrels need a mesh lid"),
        info("c2", "k2", "kb1", "seed potatoes go in after the last frost"),
        info("c3", "k3", "kb2", "splitting firewood with a maul"),
    ];
    let mut params = SaveParams::default();
    for (axis, i) in infos.iter().enumerate() {
        params = params.with_embedding(i.source_id.clone(), unit(axis));
    }
    engine.batch_save(&infos, &params).await.expect("batch save");
}

async fn vector_hits(engine: &VectorRetrieveEngine, axis: usize, k: usize) -> Vec<IndexWithScore> {
    let results = engine.retrieve(&RetrieveParams::vector(unit(axis), k)).await.expect("vector retrieve");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].retriever_type, RetrieverType::Vector);
    results.into_iter().next().map(|r| r.results).unwrap_or_default()
}

#[tokio::test]
async fn new_engine_serves_default_collection() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    assert_eq!(engine.collection_name(), "embeddings4");
    assert_eq!(engine.dimension(), DIM);
    assert!(engine.supports(RetrieverType::Keywords));
    assert!(engine.supports(RetrieverType::Vector));
    assert!(!engine.supports(RetrieverType::Graph));

    // Reconnecting to the same store reuses the collection.
    drop(engine);
    let again = VectorRetrieveEngine::connect(&tmp.path().to_string_lossy(), settings()).await.expect("reconnect");
    let names = again.connection().table_names().execute().await.expect("names");
    assert_eq!(names, vec!["embeddings4".to_string()]);
}

#[tokio::test]
async fn switching_dimension_creates_second_collection() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    engine.set_collection_dimension(8).await.expect("switch");
    assert_eq!(engine.collection_name(), "embeddings8");
    let mut names = engine.connection().table_names().execute().await.expect("names");
    names.sort();
    assert_eq!(names, vec!["embeddings4".to_string(), "embeddings8".to_string()]);

    assert!(matches!(engine.set_collection_dimension(0).await, Err(Error::InvalidInput(_))));
    assert_eq!(engine.collection_name(), "embeddings8");
}

#[tokio::test]
async fn saved_chunk_is_found_then_deleted() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    let chunk = info("solo", "k1", "kb1", "compost turns faster when it is turned weekly");
    let params = SaveParams::default().with_embedding("src-solo", unit(2));
    engine.save(&chunk, &params).await.expect("save");

    let hits = vector_hits(&engine, 2, 3).await;
    assert_eq!(hits[0].chunk_id, "solo");
    assert_eq!(hits[0].match_type, MatchType::Embedding);
    assert!((hits[0].score - 1.0).abs() < 1e-4, "dot of unit vectors, got {}", hits[0].score);

    engine.delete_by_chunk_ids(&["solo".to_string()], 0).await.expect("delete");
    assert!(vector_hits(&engine, 2, 3).await.is_empty());

    // Idempotent, and an empty list is a no-op.
    engine.delete_by_chunk_ids(&["solo".to_string()], DIM).await.expect("delete again");
    engine.delete_by_chunk_ids(&[], 0).await.expect("empty delete");
}

#[tokio::test]
async fn resaving_a_chunk_overwrites_it() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    let params = SaveParams::default().with_embedding("src-c0", unit(0));
    engine.save(&info("c0", "k1", "kb1", "first draft"), &params).await.expect("save");
    engine.save(&info("c0", "k1", "kb1", "second draft"), &params).await.expect("resave");

    let hits = vector_hits(&engine, 0, 10).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "second draft");
}

#[tokio::test]
async fn vector_results_are_ranked_and_filtered() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    seed(&engine).await;

    let hits = vector_hits(&engine, 3, 4).await;
    assert_eq!(hits.len(), 4);
    assert_eq!(hits[0].chunk_id, "c3");
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let params = RetrieveParams::vector(unit(3), 4).with_knowledge_base_ids(["kb1"]);
    let results = engine.retrieve(&params).await.expect("filtered");
    let hits = &results[0].results;
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.knowledge_base_id == "kb1"));
}

#[tokio::test]
async fn keyword_search_matches_content_terms() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    seed(&engine).await;

    let results = engine.retrieve(&RetrieveParams::keywords("lighthouse", 5)).await.expect("keywords");
    assert_eq!(results[0].retriever_type, RetrieverType::Keywords);
    let hits = &results[0].results;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, "c0");
    assert_eq!(hits[0].match_type, MatchType::Keywords);

    let scoped = RetrieveParams::keywords("firewood", 5).with_knowledge_base_ids(["kb1"]);
    let results = engine.retrieve(&scoped).await.expect("scoped keywords");
    assert!(results[0].results.is_empty());
}

#[tokio::test]
async fn keyword_search_on_empty_collection_is_empty() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    let results = engine.retrieve(&RetrieveParams::keywords("anything", 5)).await.expect("keywords");
    assert!(results[0].results.is_empty());
    assert!(results[0].error.is_none());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;

    let mut graph = RetrieveParams::keywords("x", 5);
    graph.retriever_type = RetrieverType::Graph;
    assert!(matches!(engine.retrieve(&graph).await, Err(Error::InvalidRetrieverType(RetrieverType::Graph))));
    assert!(matches!(engine.retrieve(&RetrieveParams::keywords("x", 0)).await, Err(Error::InvalidInput(_))));
    assert!(matches!(engine.retrieve(&RetrieveParams::keywords("   ", 5)).await, Err(Error::InvalidInput(_))));
    assert!(matches!(engine.retrieve(&RetrieveParams::vector(Vec::new(), 5)).await, Err(Error::InvalidInput(_))));

    let missing = engine.save(&info("c9", "k", "kb", "no vector"), &SaveParams::default()).await;
    assert!(matches!(missing, Err(Error::MissingEmbedding(_))));
}

#[tokio::test]
async fn delete_by_knowledge_id_is_scoped() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    seed(&engine).await;

    engine.delete_by_knowledge_ids(&["k1".to_string()], 0).await.expect("delete");
    let remaining: Vec<String> = vector_hits(&engine, 0, 10).await.into_iter().map(|h| h.chunk_id).collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&"c2".to_string()));
    assert!(remaining.contains(&"c3".to_string()));

    // No collection for that dimension: nothing to do.
    engine.delete_by_knowledge_ids(&["k2".to_string()], 99).await.expect("unknown dimension");
    assert_eq!(vector_hits(&engine, 0, 10).await.len(), 2);
}

#[tokio::test]
async fn copy_remaps_mapped_records_across_pages() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    seed(&engine).await;

    let request = CopyIndicesRequest {
        source_knowledge_base_id: "kb1".into(),
        knowledge_id_map: HashMap::from([("k1".to_string(), "t1".to_string()), ("k2".to_string(), "t2".to_string())]),
        chunk_id_map: HashMap::from([("c0".to_string(), "n0".to_string()), ("c2".to_string(), "n2".to_string())]),
        target_knowledge_base_id: "kb9".into(),
        dimension: DIM,
    };
    let copied = engine.copy_indices(&request).await.expect("copy");
    assert_eq!(copied, 2);

    let params = RetrieveParams::vector(unit(2), 10).with_knowledge_base_ids(["kb9"]);
    let results = engine.retrieve(&params).await.expect("target search");
    let hits = &results[0].results;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_id, "n2");
    assert_eq!(hits[0].knowledge_id, "t2");
    assert_eq!(hits[0].content, "seed potatoes go in after the last frost");

    // Source records are untouched.
    let params = RetrieveParams::vector(unit(0), 10).with_knowledge_base_ids(["kb1"]);
    assert_eq!(engine.retrieve(&params).await.expect("source search")[0].results.len(), 3);
}

#[tokio::test]
async fn copy_with_empty_mapping_writes_nothing() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    seed(&engine).await;

    let request = CopyIndicesRequest {
        source_knowledge_base_id: "kb1".into(),
        target_knowledge_base_id: "kb9".into(),
        dimension: DIM,
        ..CopyIndicesRequest::default()
    };
    assert_eq!(engine.copy_indices(&request).await.expect("copy"), 0);
    assert_eq!(vector_hits(&engine, 0, 10).await.len(), 4);
}

#[tokio::test]
async fn storage_estimate_is_pure() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    let infos = vec![info("c0", "k", "kb", "hello")];
    let params = SaveParams::default().with_embedding("src-c0", unit(0));
    // 5 + 16 + 200 + 32
    assert_eq!(engine.estimate_storage_size(&infos, &params), 253);
    assert!(vector_hits(&engine, 0, 10).await.is_empty());
}

async fn keyword_chunks(engine: &VectorRetrieveEngine, params: &RetrieveParams) -> Vec<String> {
    let results = engine.retrieve(params).await.expect("keywords");
    assert_eq!(results[0].retriever_type, RetrieverType::Keywords);
    results.into_iter().next().map(|r| r.results).unwrap_or_default().into_iter().map(|h| h.chunk_id).collect()
}

#[tokio::test]
async fn keyword_search_sees_rows_written_after_index_build() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    let first = SaveParams::default().with_embedding("src-a", unit(0));
    engine.save(&info("a", "k1", "kb1", "beeswax candles burn cleanly"), &first).await.expect("save a");
    // The first write builds the full-text index; the second lands after it.
    assert_eq!(keyword_chunks(&engine, &RetrieveParams::keywords("beeswax", 5)).await, vec!["a".to_string()]);

    let second = SaveParams::default().with_embedding("src-b", unit(1));
    engine.save(&info("b", "k1", "kb1", "the windmill pumps water uphill"), &second).await.expect("save b");
    assert_eq!(keyword_chunks(&engine, &RetrieveParams::keywords("windmill", 5)).await, vec!["b".to_string()]);

    engine.delete_by_chunk_ids(&["b".to_string()], 0).await.expect("delete b");
    assert!(keyword_chunks(&engine, &RetrieveParams::keywords("windmill", 5)).await.is_empty());
    assert_eq!(keyword_chunks(&engine, &RetrieveParams::keywords("beeswax", 5)).await, vec!["a".to_string()]);
}

fn potato_copy(dimension: usize) -> CopyIndicesRequest {
    CopyIndicesRequest {
        source_knowledge_base_id: "kb1".into(),
        knowledge_id_map: HashMap::from([("k2".to_string(), "t2".to_string())]),
        chunk_id_map: HashMap::from([("c2".to_string(), "n2".to_string())]),
        target_knowledge_base_id: "kb9".into(),
        dimension,
    }
}

#[tokio::test]
async fn copied_records_are_keyword_searchable() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    seed(&engine).await;
    assert_eq!(engine.copy_indices(&potato_copy(DIM)).await.expect("copy"), 1);

    let target = RetrieveParams::keywords("potatoes", 5).with_knowledge_base_ids(["kb9"]);
    assert_eq!(keyword_chunks(&engine, &target).await, vec!["n2".to_string()]);
    let source = RetrieveParams::keywords("potatoes", 5).with_knowledge_base_ids(["kb1"]);
    assert_eq!(keyword_chunks(&engine, &source).await, vec!["c2".to_string()]);
}

#[tokio::test]
async fn copy_targets_inactive_dimension_collection() {
    let tmp = TempDir::new().expect("tmp");
    let engine = engine(&tmp).await;
    seed(&engine).await;
    engine.set_collection_dimension(8).await.expect("switch to 8");

    assert_eq!(engine.copy_indices(&potato_copy(DIM)).await.expect("copy into embeddings4"), 1);
    assert_eq!(engine.copy_indices(&potato_copy(99)).await.expect("no such collection"), 0);
    // The active collection is untouched.
    assert!(engine.retrieve(&RetrieveParams::vector(vec![0.0; 8], 10)).await.expect("active")[0].results.is_empty());

    engine.set_collection_dimension(DIM).await.expect("switch back");
    let params = RetrieveParams::vector(unit(2), 10).with_knowledge_base_ids(["kb9"]);
    let hits = &engine.retrieve(&params).await.expect("target search")[0].results;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, "n2");
    assert_eq!(hits[0].knowledge_id, "t2");
}
