use serde::{Deserialize, Serialize};

/// How a filter combines its tag ids. Carried through for callers; scoring
/// sums every tag regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    #[default]
    And,
    Or,
}

/// One weighted tag rule of a virtual knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagFilter {
    #[serde(default)]
    pub tag_category_id: i64,
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub operator: FilterOperator,
    pub weight: f64,
}

/// A document-to-tag association. An unset weight counts as 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTag {
    pub document_id: String,
    pub tag_id: i64,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl DocumentTag {
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

/// A saved filter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualKb {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub filters: Vec<TagFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentScore {
    pub document_id: String,
    pub score: f64,
}

/// Either `virtual_kb_id` or `tag_filters` must be given; a virtual knowledge
/// base takes precedence. `limit <= 0` selects the configured default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSearchRequest {
    #[serde(default)]
    pub virtual_kb_id: Option<i64>,
    #[serde(default)]
    pub tag_filters: Vec<TagFilter>,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSearchResponse {
    pub results: Vec<DocumentScore>,
}

/// Document metadata as held by the knowledge store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub parse_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document: Document,
    pub chunk_count: u64,
}

/// Outcome of a batch lookup: successes in request order and one message per
/// failed id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentLookup {
    pub documents: Vec<DocumentInfo>,
    pub requested: usize,
    pub errors: Vec<String>,
}
