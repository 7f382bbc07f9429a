use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info};

use kbsearch_core::config::RetrievalSettings;
use kbsearch_core::error::{Error, Result};

use crate::repository::{DocumentTagRepository, VirtualKbRepository};
use crate::scoring::{accumulate_scores, top_k};
use crate::types::{TagFilter, TagSearchRequest, TagSearchResponse};

pub const DEFAULT_LIMIT: usize = 20;

/// Ranks documents by the weighted tags they carry.
pub struct TagWeightedSearch {
    tags: Arc<dyn DocumentTagRepository>,
    virtual_kbs: Arc<dyn VirtualKbRepository>,
    default_limit: usize,
}

impl TagWeightedSearch {
    pub fn new(tags: Arc<dyn DocumentTagRepository>, virtual_kbs: Arc<dyn VirtualKbRepository>) -> Self {
        Self { tags, virtual_kbs, default_limit: DEFAULT_LIMIT }
    }

    pub fn with_settings(mut self, settings: &RetrievalSettings) -> Self {
        self.default_limit = settings.tag_search_default_limit.max(1);
        self
    }

    async fn resolve_filters(&self, request: &TagSearchRequest) -> Result<Vec<TagFilter>> {
        match request.virtual_kb_id {
            Some(id) => match self.virtual_kbs.get_by_id(id).await? {
                Some(kb) => {
                    debug!(virtual_kb_id = id, filters = kb.filters.len(), "using virtual knowledge base filters");
                    Ok(kb.filters)
                }
                None => Err(Error::NotFound(format!("virtual knowledge base {}", id))),
            },
            None if request.tag_filters.is_empty() => {
                Err(Error::InvalidInput("either virtual_kb_id or tag_filters must be provided".into()))
            }
            None => Ok(request.tag_filters.clone()),
        }
    }

    pub async fn search(&self, request: &TagSearchRequest) -> Result<TagSearchResponse> {
        let filters = self.resolve_filters(request).await?;

        let mut seen = HashSet::new();
        let tag_ids: Vec<i64> = filters.iter().flat_map(|f| f.tag_ids.iter().copied()).filter(|id| seen.insert(*id)).collect();
        let fetched = try_join_all(tag_ids.iter().map(|&id| self.tags.list_documents_by_tag(id))).await.map_err(|e| {
            error!(tags = tag_ids.len(), error = %e, "failed to list tagged documents");
            e
        })?;
        let associations: HashMap<i64, _> = tag_ids.into_iter().zip(fetched).collect();

        let scores = accumulate_scores(&filters, &associations);
        let limit = usize::try_from(request.limit).ok().filter(|&l| l > 0).unwrap_or(self.default_limit);
        let results = top_k(scores, limit);
        info!(filters = filters.len(), tags = associations.len(), returned = results.len(), limit, "tag-weighted search");
        Ok(TagSearchResponse { results })
    }
}
