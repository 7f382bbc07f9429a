use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use kbsearch_core::traits::RetrieveEngine;
use kbsearch_core::types::{IndexWithScore, RetrieveParams, RetrieveResult};

/// Fans retrieval requests out to every engine that serves their mode.
pub struct RetrieveDispatcher {
    engines: Vec<Arc<dyn RetrieveEngine>>,
}

impl RetrieveDispatcher {
    pub fn new(engines: Vec<Arc<dyn RetrieveEngine>>) -> Self { Self { engines } }

    pub fn engines(&self) -> &[Arc<dyn RetrieveEngine>] { &self.engines }

    /// Runs every supported (engine, request) pair concurrently. An engine
    /// failure becomes a `RetrieveResult` carrying the error; other results
    /// are unaffected. Requests no engine supports produce nothing.
    pub async fn retrieve(&self, requests: &[RetrieveParams]) -> Vec<RetrieveResult> {
        let calls = self.engines.iter().flat_map(|engine| {
            requests.iter().filter(move |p| engine.supports(p.retriever_type)).map(move |p| async move {
                match engine.retrieve(p).await {
                    Ok(results) => results,
                    Err(e) => {
                        warn!(engine = %engine.engine_type(), retriever = %p.retriever_type, error = %e, "engine retrieval failed");
                        vec![RetrieveResult::failed(engine.engine_type(), p.retriever_type, e)]
                    }
                }
            })
        });
        let results: Vec<RetrieveResult> = join_all(calls).await.into_iter().flatten().collect();
        debug!(requests = requests.len(), results = results.len(), "dispatch completed");
        results
    }
}

/// Merges hits from several results: unique by `chunk_id` keeping the
/// better score, best first (ties by `chunk_id`), at most `k`. Failed
/// results contribute nothing.
pub fn merge_results(results: &[RetrieveResult], k: usize) -> Vec<IndexWithScore> {
    let mut by_id: HashMap<&str, &IndexWithScore> = HashMap::new();
    for h in results.iter().filter(|r| r.error.is_none()).flat_map(|r| r.results.iter()) {
        by_id.entry(h.chunk_id.as_str()).and_modify(|old| { if h.score > old.score { *old = h; } }).or_insert(h);
    }
    let mut merged: Vec<IndexWithScore> = by_id.into_values().cloned().collect();
    merged.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    merged.truncate(k);
    merged
}
