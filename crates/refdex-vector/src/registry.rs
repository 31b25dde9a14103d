//! Named vector indices: creation, incremental updates and full rebuilds.
//!
//! Each index owns a vector artifact and a chunk list kept row-aligned:
//! row `i` of the vectors embeds `chunks[i]`. The flat index has no point
//! deletion, so removing an entry re-embeds every surviving chunk.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use regex::Regex;
use tracing::{debug, info, warn};

use refdex_core::chunking::{CharacterLimitChunker, Chunker, ChunkingConfig, MIN_CHUNK_SIZE};
use refdex_core::collection::Collections;
use refdex_core::error::{Error, Result};
use refdex_core::traits::{Embedder, VectorIndex};
use refdex_core::types::{Chunk, EntryType};
use refdex_embed::catalog::{get_model_config, model_for_id, validate_dimensions, ModelConfig};
use refdex_embed::{embed_documents, BatchOptions, EmbeddingProvider, EmbeddingStats};

use crate::flat::FlatIndex;
use crate::layout::{write_json_atomic, Layout};
use crate::metadata::{IndexMetadata, IndexUpdateStats, RebuildStats};

const NAME_PATTERN: &str = r"^[a-z0-9][a-z0-9_-]*$";

/// Per-index outcome of a fan-out update. One failing index does not stop
/// the others.
pub type FanOut<T> = BTreeMap<String, Result<T>>;

pub struct VectorIndexRegistry<I: VectorIndex = FlatIndex> {
    layout: Layout,
    provider: Arc<dyn EmbeddingProvider>,
    batch: BatchOptions,
    name_pattern: Regex,
    indices: RwLock<BTreeMap<String, IndexMetadata>>,
    // serializes artifact mutations
    write_lock: Mutex<()>,
    _index: PhantomData<fn() -> I>,
}

impl<I: VectorIndex> VectorIndexRegistry<I> {
    /// Opens the registry under `data_dir`, creating nothing until the
    /// first index is created.
    pub fn open(data_dir: impl AsRef<Path>, provider: Arc<dyn EmbeddingProvider>, batch: BatchOptions) -> Result<Self> {
        let layout = Layout::new(data_dir.as_ref());
        let name_pattern = Regex::new(NAME_PATTERN).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let indices = load_registry(&layout);
        debug!(dir = %layout.root().display(), indices = indices.len(), "opened vector index registry");
        Ok(Self {
            layout,
            provider,
            batch,
            name_pattern,
            indices: RwLock::new(indices),
            write_lock: Mutex::new(()),
            _index: PhantomData,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// All indices, ordered by name.
    pub fn list_indices(&self) -> Vec<IndexMetadata> {
        self.indices.read().unwrap_or_else(PoisonError::into_inner).values().cloned().collect()
    }

    pub fn get_index(&self, name: &str) -> Result<IndexMetadata> {
        self.indices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NamedIndexNotFound(name.to_string()))
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.indices.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    /// True when the index is registered and both artifacts are on disk.
    pub fn artifacts_exist(&self, name: &str) -> bool {
        self.index_exists(name) && self.layout.vectors_file(name).exists() && self.layout.chunks_file(name).exists()
    }

    pub fn create_index(
        &self,
        name: &str,
        model_name: &str,
        dimensions: Option<usize>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IndexMetadata> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.name_pattern.is_match(name) {
            return Err(Error::InvalidConfig(format!(
                "Invalid index name '{name}': use lowercase letters, digits, '-' and '_', starting with a letter or digit"
            )));
        }
        if self.index_exists(name) {
            return Err(Error::IndexExists(name.to_string()));
        }
        let model = get_model_config(model_name)?;
        let dims = validate_dimensions(model_name, dimensions)?;
        ChunkingConfig { chunk_size, overlap: chunk_overlap, min_chunk_size: MIN_CHUNK_SIZE }.validate()?;

        let metadata = IndexMetadata::new(name, model.model_id, dims, chunk_size, chunk_overlap);
        std::fs::create_dir_all(self.layout.index_dir(name))?;
        self.write_artifacts(name, &I::with_dimensions(dims), &[])?;
        self.store_metadata(metadata.clone())?;
        info!(index = name, model = model_name, dimensions = dims, "created vector index");
        Ok(metadata)
    }

    pub fn delete_index(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.index_exists(name) {
            return Err(Error::NamedIndexNotFound(name.to_string()));
        }
        let dir = self.layout.index_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        indices.remove(name);
        write_json_atomic(&self.layout.registry_file(), &*indices)?;
        info!(index = name, "deleted vector index");
        Ok(())
    }

    /// Overwrites the running totals and bumps `updated_at`.
    pub fn update_index_stats(
        &self,
        name: &str,
        chunk_count: usize,
        total_tokens: usize,
        estimated_cost: f64,
    ) -> Result<IndexMetadata> {
        let updated = self.get_index(name)?.with_stats(chunk_count, total_tokens, estimated_cost);
        self.store_metadata(updated.clone())?;
        Ok(updated)
    }

    /// Catalog name of the index's model, or the raw model id when the
    /// catalog no longer lists it.
    pub fn model_name_for_index(&self, name: &str) -> Result<String> {
        let metadata = self.get_index(name)?;
        Ok(model_for_id(&metadata.embedding_model_id)
            .map_or_else(|| metadata.embedding_model_id.clone(), |m| m.name.to_string()))
    }

    pub fn model_for_index(&self, metadata: &IndexMetadata) -> Result<&'static ModelConfig> {
        model_for_id(&metadata.embedding_model_id).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "Vector index '{}' uses unknown embedding model '{}'",
                metadata.name, metadata.embedding_model_id
            ))
        })
    }

    /// Embedder bound to the index's model and width.
    pub fn embedder_for(&self, metadata: &IndexMetadata) -> Result<Arc<dyn Embedder>> {
        self.provider.embedder(self.model_for_index(metadata)?, metadata.dimensions)
    }

    /// Loads the vector artifact and chunk list, checking they agree with
    /// each other and with the metadata.
    pub fn load_index_data(&self, name: &str) -> Result<(I, Vec<Chunk>)> {
        let metadata = self.get_index(name)?;
        let vectors_path = self.layout.vectors_file(name);
        let chunks_path = self.layout.chunks_file(name);
        if !vectors_path.exists() || !chunks_path.exists() {
            return Err(Error::NamedIndexNotFound(name.to_string()));
        }
        let load_err = |reason: String| Error::IndexLoad { collection: name.to_string(), reason };

        let index = I::load(&vectors_path).map_err(|e| load_err(format!("{e:#}")))?;
        let raw = std::fs::read_to_string(&chunks_path)?;
        let chunks: Vec<Chunk> = serde_json::from_str(&raw).map_err(|e| load_err(format!("chunk list unreadable: {e}")))?;

        if index.len() != chunks.len() {
            return Err(load_err(format!("{} vectors but {} chunks", index.len(), chunks.len())));
        }
        if index.dimensions() != metadata.dimensions {
            return Err(load_err(format!(
                "vectors have {} dimensions, metadata says {}",
                index.dimensions(),
                metadata.dimensions
            )));
        }
        if metadata.chunk_count != chunks.len() {
            warn!(index = name, recorded = metadata.chunk_count, actual = chunks.len(), "chunk count out of date");
        }
        debug!(index = name, chunks = chunks.len(), "loaded vector index");
        Ok((index, chunks))
    }

    /// Persists both artifacts. Refuses to write them out of step.
    pub fn save_index_data(&self, name: &str, index: &I, chunks: &[Chunk]) -> Result<()> {
        if !self.index_exists(name) {
            return Err(Error::NamedIndexNotFound(name.to_string()));
        }
        self.write_artifacts(name, index, chunks)
    }

    /// Chunks and embeds one entry and appends it to the index.
    pub fn add_entry_to_index(
        &self,
        name: &str,
        entry_id: &str,
        entry_type: EntryType,
        searchable_text: &str,
    ) -> Result<IndexUpdateStats> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let metadata = self.get_index(name)?;
        let (mut index, mut chunks) = self.load_index_data(name)?;
        let model = self.model_for_index(&metadata)?;

        let new_chunks = chunk_entries(&metadata, model, [(entry_id, entry_type, searchable_text.to_string())])?;
        if new_chunks.is_empty() {
            debug!(index = name, entry_id, "no chunks for entry");
            return Ok(IndexUpdateStats::default());
        }

        let embedder = self.embedder_for(&metadata)?;
        let texts: Vec<String> = new_chunks.iter().map(|c| c.text.clone()).collect();
        let embedded = embed_documents(&embedder, &texts, self.batch)?;
        let stats = EmbeddingStats::from_tokens(model, embedded.total_tokens, texts.len());

        index.add(&embedded.vectors).map_err(Error::Other)?;
        chunks.extend(new_chunks);
        self.write_artifacts(name, &index, &chunks)?;
        self.update_index_stats(
            name,
            chunks.len(),
            metadata.total_tokens + stats.total_tokens,
            metadata.estimated_cost + stats.total_cost,
        )?;

        info!(index = name, entry_id, %entry_type, chunks = texts.len(), "added entry to vector index");
        Ok(IndexUpdateStats { chunks: texts.len(), tokens: stats.total_tokens, cost: stats.total_cost })
    }

    /// Drops every chunk of `entry_id` and rebuilds the vectors from the
    /// survivors. Returns how many chunks were removed.
    ///
    /// Token and cost totals are left as they were: they record what was
    /// spent on the index, and the re-embedding is not billed to them.
    pub fn remove_entry_from_index(&self, name: &str, entry_id: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let metadata = self.get_index(name)?;
        let (_, chunks) = self.load_index_data(name)?;

        let before = chunks.len();
        let remaining: Vec<Chunk> = chunks.into_iter().filter(|c| c.entry_id != entry_id).collect();
        let removed = before - remaining.len();
        if removed == 0 {
            debug!(index = name, entry_id, "entry not in vector index");
            return Ok(0);
        }

        let mut index = I::with_dimensions(metadata.dimensions);
        if !remaining.is_empty() {
            let embedder = self.embedder_for(&metadata)?;
            let texts: Vec<String> = remaining.iter().map(|c| c.text.clone()).collect();
            let embedded = embed_documents(&embedder, &texts, self.batch)?;
            index.add(&embedded.vectors).map_err(Error::Other)?;
        }
        self.write_artifacts(name, &index, &remaining)?;
        self.update_index_stats(name, remaining.len(), metadata.total_tokens, metadata.estimated_cost)?;

        info!(index = name, entry_id, removed, "removed entry from vector index");
        Ok(removed)
    }

    /// Re-chunks and re-embeds every entry of every collection, replacing
    /// both artifacts. Totals are reset to this rebuild's usage.
    pub fn rebuild_index(&self, name: &str, collections: &Collections) -> Result<RebuildStats> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let metadata = self.get_index(name)?;
        let model = self.model_for_index(&metadata)?;
        info!(index = name, model = model.name, "rebuilding vector index");

        let mut stats = RebuildStats::default();
        let mut sources = Vec::new();
        for t in EntryType::ALL {
            let entries = collections.get(t).list_all()?;
            let count = entries.len();
            match t {
                EntryType::Paper => stats.papers = count,
                EntryType::Book => stats.books = count,
                EntryType::Media => stats.media = count,
            }
            sources.extend(entries.into_iter().map(|e| (e.id().to_string(), t, e.searchable_text())));
        }
        let chunks = chunk_entries(&metadata, model, sources.iter().map(|(id, t, text)| (id.as_str(), *t, text.clone())))?;
        stats.chunks = chunks.len();

        let mut index = I::with_dimensions(metadata.dimensions);
        if chunks.is_empty() {
            warn!(index = name, "no content to index");
        } else {
            let embedder = self.embedder_for(&metadata)?;
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let embedded = embed_documents(&embedder, &texts, self.batch)?;
            let usage = EmbeddingStats::from_tokens(model, embedded.total_tokens, texts.len());
            stats.tokens = usage.total_tokens;
            stats.cost = usage.total_cost;
            index.add(&embedded.vectors).map_err(Error::Other)?;
        }
        self.write_artifacts(name, &index, &chunks)?;
        self.update_index_stats(name, chunks.len(), stats.tokens, stats.cost)?;

        info!(
            index = name,
            papers = stats.papers,
            books = stats.books,
            media = stats.media,
            chunks = stats.chunks,
            tokens = stats.tokens,
            cost = stats.cost,
            "vector index built"
        );
        Ok(stats)
    }

    /// Adds the entry to every registered index.
    pub fn update_all_indices_with_entry(
        &self,
        entry_id: &str,
        entry_type: EntryType,
        searchable_text: &str,
    ) -> FanOut<IndexUpdateStats> {
        self.fan_out(|name| self.add_entry_to_index(name, entry_id, entry_type, searchable_text))
    }

    /// Removes the entry from every registered index.
    pub fn remove_entry_from_all_indices(&self, entry_id: &str) -> FanOut<usize> {
        self.fan_out(|name| self.remove_entry_from_index(name, entry_id))
    }

    fn fan_out<T>(&self, mut op: impl FnMut(&str) -> Result<T>) -> FanOut<T> {
        self.list_indices()
            .into_iter()
            .map(|m| {
                let outcome = op(&m.name);
                if let Err(e) = &outcome {
                    warn!(index = %m.name, error = %e, "vector index update failed");
                }
                (m.name, outcome)
            })
            .collect()
    }

    fn write_artifacts(&self, name: &str, index: &I, chunks: &[Chunk]) -> Result<()> {
        if index.len() != chunks.len() {
            return Err(Error::Operation(format!(
                "refusing to save vector index '{name}': {} vectors for {} chunks",
                index.len(),
                chunks.len()
            )));
        }
        write_json_atomic(&self.layout.chunks_file(name), chunks)?;
        index.save(&self.layout.vectors_file(name))?;
        debug!(index = name, chunks = chunks.len(), "saved vector index");
        Ok(())
    }

    /// Writes the per-index metadata file, then the registry file.
    fn store_metadata(&self, metadata: IndexMetadata) -> Result<()> {
        write_json_atomic(&self.layout.metadata_file(&metadata.name), &metadata)?;
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        indices.insert(metadata.name.clone(), metadata);
        write_json_atomic(&self.layout.registry_file(), &*indices)?;
        Ok(())
    }
}

/// Word windows with the index's parameters, then split to the model's
/// character budget.
fn chunk_entries<'a>(
    metadata: &IndexMetadata,
    model: &ModelConfig,
    entries: impl IntoIterator<Item = (&'a str, EntryType, String)>,
) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(metadata.chunk_size, metadata.chunk_overlap, MIN_CHUNK_SIZE)?;
    let chunks: Vec<Chunk> = entries
        .into_iter()
        .flat_map(|(id, t, text)| chunker.chunk_text(&text, id, t))
        .collect();
    Ok(CharacterLimitChunker::for_token_budget(model.max_input_tokens, model.chars_per_token)?.process_chunks(chunks))
}

/// Reads the registry file. When it is missing or unreadable, the registry
/// is recovered from the per-index metadata files.
fn load_registry(layout: &Layout) -> BTreeMap<String, IndexMetadata> {
    let path = layout.registry_file();
    if path.exists() {
        match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<BTreeMap<String, IndexMetadata>>(&raw).map_err(anyhow::Error::from))
        {
            Ok(indices) => return indices,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read vector index registry; recovering from index metadata"),
        }
    }
    scan_index_metadata(layout)
}

fn scan_index_metadata(layout: &Layout) -> BTreeMap<String, IndexMetadata> {
    let mut indices = BTreeMap::new();
    let Ok(dirs) = std::fs::read_dir(layout.root().join("vectors")) else {
        return indices;
    };
    for dir in dirs.flatten() {
        let meta_path = dir.path().join("metadata.json");
        let Ok(raw) = std::fs::read_to_string(&meta_path) else {
            continue;
        };
        match serde_json::from_str::<IndexMetadata>(&raw) {
            Ok(m) => {
                indices.insert(m.name.clone(), m);
            }
            Err(e) => warn!(path = %meta_path.display(), error = %e, "skipping unreadable index metadata"),
        }
    }
    indices
}
