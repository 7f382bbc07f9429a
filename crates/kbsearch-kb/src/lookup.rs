use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use kbsearch_core::error::{Error, Result};

use crate::repository::DocumentSource;
use crate::types::{DocumentInfo, DocumentLookup};

pub const DEFAULT_MAX_ITEMS: usize = 10;

async fn fetch_one(source: &dyn DocumentSource, id: &str) -> Result<DocumentInfo> {
    let document = source.get_document(id).await?;
    let chunk_count = source.count_chunks(id).await?;
    Ok(DocumentInfo { document, chunk_count })
}

/// Looks up every id concurrently. One id failing does not affect the
/// others; the call only fails when all of them do. Repeated ids are
/// fetched once.
pub async fn fetch_document_infos(source: &dyn DocumentSource, ids: &[String], max_items: usize) -> Result<DocumentLookup> {
    if ids.is_empty() {
        return Err(Error::InvalidInput("knowledge_ids must be a non-empty list".into()));
    }
    if ids.len() > max_items {
        return Err(Error::InvalidInput(format!("at most {} documents per lookup, got {}", max_items, ids.len())));
    }
    let mut seen = HashSet::new();
    let unique: Vec<&str> = ids.iter().map(String::as_str).filter(|id| seen.insert(*id)).collect();

    let fetched = join_all(unique.iter().map(|id| fetch_one(source, id))).await;
    let mut by_id: HashMap<&str, Result<DocumentInfo>> = unique.iter().copied().zip(fetched).collect();

    let mut lookup = DocumentLookup { requested: unique.len(), ..DocumentLookup::default() };
    for id in &unique {
        match by_id.remove(id) {
            Some(Ok(info)) => lookup.documents.push(info),
            Some(Err(e)) => {
                warn!(knowledge_id = %id, error = %e, "document lookup failed");
                lookup.errors.push(format!("{}: {}", id, e));
            }
            None => {}
        }
    }
    if lookup.documents.is_empty() {
        return Err(Error::AllLookupsFailed(lookup.requested, lookup.errors.join("; ")));
    }
    info!(found = lookup.documents.len(), requested = lookup.requested, "document lookup");
    Ok(lookup)
}
