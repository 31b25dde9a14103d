//! Semantic search over one named vector index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use refdex_core::collection::Collections;
use refdex_core::error::{Error, Result};
use refdex_core::fragments::extract_fragments;
use refdex_core::traits::{Embedder, VectorIndex};
use refdex_core::types::{Chunk, EntryType, SearchOptions, SearchResult};
use refdex_embed::catalog::get_model_config;

use crate::flat::FlatIndex;
use crate::registry::VectorIndexRegistry;

/// Candidates fetched per requested result, before aggregation by entry.
const OVERFETCH: usize = 10;

struct LoadedIndex<I> {
    updated_at: DateTime<Utc>,
    index: I,
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
}

pub struct VectorSearch<I: VectorIndex = FlatIndex> {
    registry: Arc<VectorIndexRegistry<I>>,
    collections: Collections,
    index_name: String,
    requested_model: Option<String>,
    cached: Mutex<Option<Arc<LoadedIndex<I>>>>,
}

impl<I: VectorIndex> VectorSearch<I> {
    pub fn new(registry: Arc<VectorIndexRegistry<I>>, collections: Collections, index_name: impl Into<String>) -> Self {
        Self { registry, collections, index_name: index_name.into(), requested_model: None, cached: Mutex::new(None) }
    }

    /// Pins the catalog model the caller expects the index to use. Searching
    /// an index built with a different model fails with `ModelMismatch`.
    #[must_use]
    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.requested_model = Some(model_name.into());
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index_exists(&self) -> bool {
        self.registry.artifacts_exist(&self.index_name)
    }

    fn check_model(&self) -> Result<()> {
        let Some(requested) = &self.requested_model else {
            return Ok(());
        };
        let metadata = self.registry.get_index(&self.index_name)?;
        let requested_id = get_model_config(requested)?.model_id;
        if requested_id != metadata.embedding_model_id {
            return Err(Error::ModelMismatch {
                index: self.index_name.clone(),
                index_model: self.registry.model_name_for_index(&self.index_name)?,
                requested: requested.clone(),
            });
        }
        Ok(())
    }

    /// Loaded artifacts, reloaded whenever the registry reports a newer
    /// `updated_at` than the cached copy.
    fn loaded(&self) -> Result<Arc<LoadedIndex<I>>> {
        let metadata = self.registry.get_index(&self.index_name)?;
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cached.as_ref().filter(|c| c.updated_at == metadata.updated_at) {
            return Ok(Arc::clone(hit));
        }
        let (index, chunks) = self.registry.load_index_data(&self.index_name)?;
        let embedder = self.registry.embedder_for(&metadata)?;
        let loaded = Arc::new(LoadedIndex { updated_at: metadata.updated_at, index, chunks, embedder });
        *cached = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Embeds `query`, keeps each entry's best chunk and returns the top
    /// `opts.top_k` entries. An empty `entry_types` searches every type.
    pub fn search(
        &self,
        query: &str,
        entry_id: Option<&str>,
        opts: &SearchOptions,
        entry_types: &[EntryType],
    ) -> Result<Vec<SearchResult>> {
        let preview: String = query.chars().take(100).collect();
        info!(index = %self.index_name, query = %preview, "semantic search");
        self.check_model()?;
        let loaded = self.loaded()?;

        let search_k = opts.top_k.saturating_mul(OVERFETCH).min(loaded.chunks.len());
        if search_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = loaded.embedder.embed_query(query)?;
        let hits = loaded.index.search(&query_vector, search_k).map_err(Error::Other)?;
        debug!(candidates = hits.len(), "retrieved nearest chunks");

        let terms: Vec<&str> = query.split_whitespace().collect();
        let results: Vec<SearchResult> = aggregate_by_entry(&hits, &loaded.chunks, entry_id, entry_types, opts.top_k)
            .into_iter()
            .map(|(score, chunk)| self.to_result(score, chunk, &terms, opts))
            .collect();
        info!(found = results.len(), "semantic search finished");
        Ok(results)
    }

    fn to_result(&self, score: f32, chunk: &Chunk, terms: &[&str], opts: &SearchOptions) -> SearchResult {
        let entry = match self.collections.resolve(chunk.entry_type, &chunk.entry_id) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(entry_id = %chunk.entry_id, error = %e, "could not resolve indexed entry");
                None
            }
        };
        let content = entry.as_ref().map_or_else(|| chunk.text.clone(), |e| e.searchable_text());
        let fragments = if opts.want_fragments {
            extract_fragments(&content, terms, opts.context_lines, opts.max_fragments)
        } else {
            Vec::new()
        };
        SearchResult {
            entry_id: chunk.entry_id.clone(),
            score,
            matched_content: content,
            entry_type: chunk.entry_type,
            entry,
            fragments,
        }
    }
}

/// Reduces chunk hits to each entry's best chunk, best entries first.
///
/// Hits whose row is out of range or that fail the entry filters are
/// dropped. Entries with equal scores keep the order they were first seen.
pub fn aggregate_by_entry<'a>(
    hits: &[(usize, f32)],
    chunks: &'a [Chunk],
    entry_id: Option<&str>,
    entry_types: &[EntryType],
    top_k: usize,
) -> Vec<(f32, &'a Chunk)> {
    let mut best: Vec<(f32, &'a Chunk)> = Vec::new();
    let mut slot_of: HashMap<&'a str, usize> = HashMap::new();

    for &(row, score) in hits {
        let Some(chunk) = chunks.get(row) else {
            continue;
        };
        if entry_id.is_some_and(|id| id != chunk.entry_id) {
            continue;
        }
        if !entry_types.is_empty() && !entry_types.contains(&chunk.entry_type) {
            continue;
        }
        match slot_of.get(chunk.entry_id.as_str()) {
            Some(&slot) if best[slot].0 >= score => {}
            Some(&slot) => best[slot] = (score, chunk),
            None => {
                slot_of.insert(chunk.entry_id.as_str(), best.len());
                best.push((score, chunk));
            }
        }
    }

    best.sort_by(|a, b| b.0.total_cmp(&a.0));
    best.truncate(top_k);
    best
}
