use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{EntryType, LexicalDocument, RankedDocument};

/// A bibliographic record as seen by the search core.
pub trait Entry: Debug + Send + Sync {
    fn id(&self) -> &str;
    fn entry_type(&self) -> EntryType;
    /// All content fields plus quote texts, separated by blank lines.
    fn searchable_text(&self) -> String;
}

/// Read access to one record collection (papers, books or media).
pub trait Collection: Send + Sync {
    fn entry_type(&self) -> EntryType;
    fn list_all(&self) -> Result<Vec<Arc<dyn Entry>>>;
    fn get(&self, id: &str) -> Result<Option<Arc<dyn Entry>>>;
}

/// Keyword ranking structure over `{id, content}` documents.
///
/// `build` with a location persists the structure there; `None` keeps it
/// in memory (used for single-document scoring).
pub trait LexicalRanker: Send + Sync + Sized {
    fn build(documents: &[LexicalDocument], location: Option<&Path>) -> anyhow::Result<Self>;
    fn open(location: &Path) -> anyhow::Result<Self>;
    /// Top `k` documents, best first. Only documents that match the query appear.
    fn query(&self, text: &str, k: usize) -> anyhow::Result<Vec<RankedDocument>>;
    fn num_documents(&self) -> usize;
}

/// Vector plus the number of input tokens billed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEmbedding {
    pub vector: Vec<f32>,
    pub token_count: usize,
}

/// An embedding model bound to one `(model_id, dimensions)` pair.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    /// Maximum input length in tokens; chunk budgets are derived from it.
    fn max_input_tokens(&self) -> usize;
    /// Embedding for indexing a document chunk.
    fn embed_document(&self, text: &str) -> Result<DocumentEmbedding>;
    /// Embedding for a search query. Some models produce different vectors
    /// for the two purposes.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Similarity index over fixed-width vectors, addressed by row.
///
/// Rows are append-only: there is no point deletion.
pub trait VectorIndex: Send + Sync + Sized {
    fn with_dimensions(dimensions: usize) -> Self;
    fn dimensions(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn add(&mut self, vectors: &[Vec<f32>]) -> anyhow::Result<()>;
    /// `(row, similarity)` pairs, most similar first.
    fn search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<(usize, f32)>>;
    fn save(&self, path: &Path) -> anyhow::Result<()>;
    fn load(path: &Path) -> anyhow::Result<Self>;
}
