//! Application-facing facade over the lexical and vector search stacks.
//!
//! `SearchService` owns the collections, one keyword index per collection
//! and the registry of named vector indices. Callers report saved and
//! deleted entries here and every index is kept in step.

pub mod settings;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use refdex_core::collection::Collections;
use refdex_core::config::Settings;
use refdex_core::error::{Error, Result};
use refdex_core::traits::Entry;
use refdex_core::types::{EntryType, SearchOptions, SearchResult};
use refdex_embed::{BatchOptions, DefaultEmbeddingProvider, EmbeddingProvider};
use refdex_text::CombinedLexicalSearch;
use refdex_vector::{FanOut, IndexUpdateStats, RebuildStats, VectorIndexRegistry, VectorSearch};

pub use settings::{SettingsStore, UserSettings};

/// Directory under the data dir holding one keyword index per collection.
pub const SEARCH_INDEX_DIR: &str = "search_index";

/// What happened to each index after an entry was saved.
#[derive(Debug)]
pub struct EntryUpdate {
    pub lexical_count: usize,
    pub vector: FanOut<IndexUpdateStats>,
}

#[derive(Debug)]
pub struct EntryRemoval {
    pub lexical_count: usize,
    /// Chunks removed per vector index.
    pub vector: FanOut<usize>,
}

#[derive(Debug)]
pub struct ReindexReport {
    pub lexical: BTreeMap<EntryType, usize>,
    pub vector: FanOut<RebuildStats>,
}

/// Summary of a vector index for listings.
#[derive(Debug, Clone, Serialize)]
pub struct VectorIndexSummary {
    pub name: String,
    pub model: String,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub is_default: bool,
}

pub struct SearchService {
    settings: Settings,
    data_dir: PathBuf,
    collections: Collections,
    lexical: CombinedLexicalSearch,
    vectors: Arc<VectorIndexRegistry>,
    searchers: Mutex<HashMap<String, Arc<VectorSearch>>>,
    user_settings: SettingsStore,
}

impl SearchService {
    /// Service backed by the embedding provider the settings describe.
    pub fn new(settings: &Settings, collections: Collections) -> Result<Self> {
        let provider = Arc::new(DefaultEmbeddingProvider::new(settings.embedding.clone()));
        Self::with_provider(settings, collections, provider)
    }

    pub fn with_provider(
        settings: &Settings,
        collections: Collections,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        settings.validate()?;
        let data_dir = settings.data_dir();
        std::fs::create_dir_all(&data_dir)?;
        let batch = BatchOptions { workers: settings.embedding.workers, show_progress: settings.embedding.show_progress };
        let vectors = Arc::new(VectorIndexRegistry::open(&data_dir, provider, batch)?);
        let lexical = CombinedLexicalSearch::new(&collections, &data_dir.join(SEARCH_INDEX_DIR));
        info!(data_dir = %data_dir.display(), indices = vectors.list_indices().len(), "search service ready");
        Ok(Self {
            settings: settings.clone(),
            user_settings: SettingsStore::new(&data_dir),
            data_dir,
            collections,
            lexical,
            vectors,
            searchers: Mutex::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn lexical(&self) -> &CombinedLexicalSearch {
        &self.lexical
    }

    pub fn vectors(&self) -> &Arc<VectorIndexRegistry> {
        &self.vectors
    }

    /// Search options seeded from the configured defaults.
    pub fn default_search_options(&self) -> SearchOptions {
        let search = self.settings.search;
        SearchOptions {
            top_k: search.top_k,
            want_fragments: false,
            context_lines: search.context_lines,
            max_fragments: search.max_fragments,
        }
    }

    /// Brings every index up to date with a created or edited entry.
    ///
    /// The entry's keyword index is rebuilt. In each vector index any old
    /// chunks of the entry are dropped before the new text is added, so an
    /// edit never leaves stale chunks behind. An index whose removal failed
    /// is left untouched and reports that error. A failing vector index does
    /// not stop the others.
    pub fn entry_saved(&self, entry: &dyn Entry) -> Result<EntryUpdate> {
        let entry_type = entry.entry_type();
        let lexical_count = self.lexical.index(entry_type).rebuild_index()?;

        let text = entry.searchable_text();
        let vector: FanOut<IndexUpdateStats> = self
            .vectors
            .remove_entry_from_all_indices(entry.id())
            .into_iter()
            .map(|(name, removed)| {
                let outcome = removed.and_then(|_| self.vectors.add_entry_to_index(&name, entry.id(), entry_type, &text));
                if let Err(e) = &outcome {
                    warn!(index = %name, entry_id = entry.id(), error = %e, "vector index not updated");
                }
                (name, outcome)
            })
            .collect();
        info!(entry_id = entry.id(), %entry_type, lexical_count, vector_indices = vector.len(), "entry indexed");
        Ok(EntryUpdate { lexical_count, vector })
    }

    /// Drops a deleted entry from its keyword index and every vector index.
    pub fn entry_deleted(&self, entry_type: EntryType, entry_id: &str) -> Result<EntryRemoval> {
        let lexical_count = self.lexical.index(entry_type).rebuild_index()?;
        let vector = self.vectors.remove_entry_from_all_indices(entry_id);
        info!(entry_id, %entry_type, lexical_count, "entry removed from indices");
        Ok(EntryRemoval { lexical_count, vector })
    }

    /// Rebuilds every keyword index, then every vector index.
    pub fn reindex(&self) -> Result<ReindexReport> {
        let lexical = self.lexical.rebuild_all_indices()?;
        let vector = self
            .vectors
            .list_indices()
            .into_iter()
            .map(|m| {
                let outcome = self.vectors.rebuild_index(&m.name, &self.collections);
                if let Err(e) = &outcome {
                    warn!(index = %m.name, error = %e, "vector index rebuild failed");
                }
                (m.name, outcome)
            })
            .collect();
        Ok(ReindexReport { lexical, vector })
    }

    /// Keyword search across the given collections; an empty list means all.
    pub fn keyword_search(&self, query: &str, opts: &SearchOptions, entry_types: &[EntryType]) -> Vec<SearchResult> {
        let types = if entry_types.is_empty() { &EntryType::ALL[..] } else { entry_types };
        self.lexical.search(query, opts, types)
    }

    /// Keyword search in one collection, optionally inside a single entry.
    pub fn keyword_search_collection(
        &self,
        entry_type: EntryType,
        query: &str,
        entry_id: Option<&str>,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.lexical.search_collection(entry_type, query, entry_id, opts)
    }

    /// Semantic search in `index`, or in the default index when `None`.
    pub fn semantic_search(
        &self,
        query: &str,
        index: Option<&str>,
        entry_id: Option<&str>,
        opts: &SearchOptions,
        entry_types: &[EntryType],
    ) -> Result<Vec<SearchResult>> {
        let name = match index {
            Some(name) => name.to_string(),
            None => self.get_default_vector_index().ok_or_else(|| {
                Error::InvalidConfig(
                    "no vector index named and no default set. Pass an index name or call set_default_vector_index()"
                        .into(),
                )
            })?,
        };
        self.searcher(&name).search(query, entry_id, opts, entry_types)
    }

    fn searcher(&self, name: &str) -> Arc<VectorSearch> {
        let mut searchers = self.searchers.lock().unwrap_or_else(PoisonError::into_inner);
        let searcher = searchers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(VectorSearch::new(Arc::clone(&self.vectors), self.collections.clone(), name))
        });
        Arc::clone(searcher)
    }

    pub fn list_vector_indices(&self) -> Vec<VectorIndexSummary> {
        let default = self.get_default_vector_index();
        self.vectors
            .list_indices()
            .into_iter()
            .map(|m| VectorIndexSummary {
                model: self.vectors.model_name_for_index(&m.name).unwrap_or_else(|_| m.embedding_model_id.clone()),
                is_default: default.as_deref() == Some(m.name.as_str()),
                dimensions: m.dimensions,
                chunk_count: m.chunk_count,
                name: m.name,
            })
            .collect()
    }

    /// Deletes a vector index, clearing the default if it pointed there.
    pub fn delete_vector_index(&self, name: &str) -> Result<()> {
        self.vectors.delete_index(name)?;
        self.searchers.lock().unwrap_or_else(PoisonError::into_inner).remove(name);
        if self.get_default_vector_index().as_deref() == Some(name) {
            self.clear_default_vector_index()?;
        }
        Ok(())
    }

    pub fn set_default_vector_index(&self, name: &str) -> Result<()> {
        if !self.vectors.index_exists(name) {
            return Err(Error::NamedIndexNotFound(name.to_string()));
        }
        let mut settings = self.user_settings.load();
        settings.default_vector_index = Some(name.to_string());
        self.user_settings.save(&settings)?;
        info!(index = name, "default vector index set");
        Ok(())
    }

    /// The persisted default index, if one is set.
    pub fn get_default_vector_index(&self) -> Option<String> {
        self.user_settings.load().default_vector_index
    }

    pub fn clear_default_vector_index(&self) -> Result<()> {
        let mut settings = self.user_settings.load();
        if settings.default_vector_index.take().is_some() {
            self.user_settings.save(&settings)?;
            info!("default vector index cleared");
        }
        Ok(())
    }
}
