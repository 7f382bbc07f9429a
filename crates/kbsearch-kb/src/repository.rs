//! Storage boundaries consumed by tag search and document lookup, plus
//! in-memory implementations for embedding and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use kbsearch_core::error::{Error, Result};

use crate::types::{Document, DocumentTag, VirtualKb};

#[async_trait]
pub trait DocumentTagRepository: Send + Sync {
    async fn list_documents_by_tag(&self, tag_id: i64) -> Result<Vec<DocumentTag>>;
}

#[async_trait]
pub trait VirtualKbRepository: Send + Sync {
    /// `Ok(None)` when no virtual knowledge base has this id.
    async fn get_by_id(&self, id: i64) -> Result<Option<VirtualKb>>;
}

/// Document metadata and chunk counts, keyed by knowledge id.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get_document(&self, id: &str) -> Result<Document>;

    async fn count_chunks(&self, id: &str) -> Result<u64>;
}

#[derive(Default)]
pub struct InMemoryTagStore {
    associations: RwLock<Vec<DocumentTag>>,
}

impl InMemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the association, replacing an existing one for the same
    /// document and tag.
    pub fn assign_tag(&self, tag: DocumentTag) {
        let mut associations = self.associations.write();
        match associations.iter_mut().find(|a| a.document_id == tag.document_id && a.tag_id == tag.tag_id) {
            Some(existing) => *existing = tag,
            None => associations.push(tag),
        }
    }

    pub fn remove_tag(&self, document_id: &str, tag_id: i64) {
        self.associations.write().retain(|a| !(a.document_id == document_id && a.tag_id == tag_id));
    }
}

#[async_trait]
impl DocumentTagRepository for InMemoryTagStore {
    async fn list_documents_by_tag(&self, tag_id: i64) -> Result<Vec<DocumentTag>> {
        Ok(self.associations.read().iter().filter(|a| a.tag_id == tag_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryVirtualKbStore {
    kbs: RwLock<HashMap<i64, VirtualKb>>,
}

impl InMemoryVirtualKbStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kb: VirtualKb) {
        self.kbs.write().insert(kb.id, kb);
    }
}

#[async_trait]
impl VirtualKbRepository for InMemoryVirtualKbStore {
    async fn get_by_id(&self, id: i64) -> Result<Option<VirtualKb>> {
        Ok(self.kbs.read().get(&id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, (Document, u64)>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: Document, chunk_count: u64) {
        self.documents.write().insert(document.id.clone(), (document, chunk_count));
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentStore {
    async fn get_document(&self, id: &str) -> Result<Document> {
        self.documents.read().get(id).map(|(d, _)| d.clone()).ok_or_else(|| Error::NotFound(format!("document {}", id)))
    }

    async fn count_chunks(&self, id: &str) -> Result<u64> {
        self.documents.read().get(id).map(|(_, n)| *n).ok_or_else(|| Error::NotFound(format!("document {}", id)))
    }
}
