use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use refdex_core::error::{Error, Result};
use refdex_core::traits::{DocumentEmbedding, Embedder, VectorIndex};
use refdex_core::{Collections, EntryType, MemoryCollection, Record};
use refdex_embed::catalog::ModelConfig;
use refdex_embed::{BatchOptions, EmbeddingProvider, FakeEmbedder};
use refdex_vector::VectorIndexRegistry;

/// Fake embeddings that count how many texts were embedded.
#[derive(Default)]
struct CountingProvider {
    embedded: Arc<AtomicUsize>,
}

struct CountingEmbedder {
    inner: FakeEmbedder,
    embedded: Arc<AtomicUsize>,
}

impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
    fn max_input_tokens(&self) -> usize {
        self.inner.max_input_tokens()
    }
    fn embed_document(&self, text: &str) -> Result<DocumentEmbedding> {
        self.embedded.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_document(text)
    }
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_query(text)
    }
}

impl EmbeddingProvider for CountingProvider {
    fn embedder(&self, model: &'static ModelConfig, dimensions: usize) -> Result<Arc<dyn Embedder>> {
        Ok(Arc::new(CountingEmbedder {
            inner: FakeEmbedder::new(model.model_id, dimensions, model.max_input_tokens),
            embedded: Arc::clone(&self.embedded),
        }))
    }
}

fn open(tmp: &TempDir, provider: Arc<dyn EmbeddingProvider>) -> VectorIndexRegistry {
    VectorIndexRegistry::open(tmp.path(), provider, BatchOptions { workers: 3, show_progress: false }).unwrap()
}

fn words(prefix: &str, n: usize) -> String {
    (0..n).map(|i| format!("{prefix}{i}")).collect::<Vec<_>>().join(" ")
}

fn assert_consistent(reg: &VectorIndexRegistry, name: &str) -> usize {
    let (index, chunks) = reg.load_index_data(name).unwrap();
    let meta = reg.get_index(name).unwrap();
    assert_eq!(index.len(), chunks.len());
    assert_eq!(meta.chunk_count, chunks.len());
    assert_eq!(index.dimensions(), meta.dimensions);
    chunks.len()
}

#[test]
fn add_and_remove_keep_artifacts_in_step() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(CountingProvider::default());
    let reg = open(&tmp, provider.clone());
    reg.create_index("small", "titan-v2", None, 100, 20).unwrap();

    let a = reg.add_entry_to_index("small", "a", EntryType::Paper, &words("alpha", 260)).unwrap();
    assert_eq!(a.chunks, 3);
    assert_eq!(a.tokens, 300);
    let b = reg.add_entry_to_index("small", "b", EntryType::Book, &words("beta", 90)).unwrap();
    assert_eq!(b.chunks, 1);
    assert_eq!(assert_consistent(&reg, "small"), 4);

    let meta = reg.get_index("small").unwrap();
    assert_eq!(meta.total_tokens, 390);
    assert!((meta.estimated_cost - (a.cost + b.cost)).abs() < 1e-12);

    let before = provider.embedded.load(Ordering::SeqCst);
    assert_eq!(reg.remove_entry_from_index("small", "a").unwrap(), 3);
    // survivors are re-embedded
    assert_eq!(provider.embedded.load(Ordering::SeqCst) - before, 1);
    assert_eq!(assert_consistent(&reg, "small"), 1);

    let (_, chunks) = reg.load_index_data("small").unwrap();
    assert!(chunks.iter().all(|c| c.entry_id == "b"));
    let after = reg.get_index("small").unwrap();
    assert_eq!(after.total_tokens, meta.total_tokens);
    assert!((after.estimated_cost - meta.estimated_cost).abs() < 1e-12);

    assert_eq!(reg.remove_entry_from_index("small", "missing").unwrap(), 0);
    assert_eq!(reg.remove_entry_from_index("small", "b").unwrap(), 1);
    assert_eq!(assert_consistent(&reg, "small"), 0);
}

#[test]
fn empty_text_adds_nothing() {
    let tmp = TempDir::new().unwrap();
    let reg = open(&tmp, Arc::new(CountingProvider::default()));
    reg.create_index("e", "titan-v2", None, 300, 50).unwrap();
    let stats = reg.add_entry_to_index("e", "blank", EntryType::Media, "  \n ").unwrap();
    assert_eq!(stats.chunks, 0);
    assert_eq!(assert_consistent(&reg, "e"), 0);
}

#[test]
fn oversized_chunks_are_split_to_the_model_budget() {
    let tmp = TempDir::new().unwrap();
    let reg = open(&tmp, Arc::new(CountingProvider::default()));
    // cohere-en allows 512 tokens, roughly 2400 characters
    reg.create_index("cohere", "cohere-en", None, 300, 50).unwrap();
    let long_words = (0..300).map(|i| format!("{}{i}", "x".repeat(20))).collect::<Vec<_>>().join(" ");
    let stats = reg.add_entry_to_index("cohere", "long", EntryType::Paper, &long_words).unwrap();
    assert!(stats.chunks > 1);
    let (_, chunks) = reg.load_index_data("cohere").unwrap();
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 2406));
    assert!(chunks.iter().enumerate().all(|(i, c)| c.chunk_index == i));
}

#[test]
fn rebuild_resets_totals_and_handles_empty_library() {
    let tmp = TempDir::new().unwrap();
    let reg = open(&tmp, Arc::new(CountingProvider::default()));
    reg.create_index("r", "titan-v2", None, 300, 50).unwrap();
    reg.add_entry_to_index("r", "stale", EntryType::Paper, &words("old", 40)).unwrap();

    let papers = Arc::new(MemoryCollection::new(EntryType::Paper));
    let books = Arc::new(MemoryCollection::new(EntryType::Book));
    let media = Arc::new(MemoryCollection::new(EntryType::Media));
    let collections = Collections::new(papers.clone(), books, media).unwrap();

    let empty = reg.rebuild_index("r", &collections).unwrap();
    assert_eq!(empty.chunks, 0);
    assert_eq!(assert_consistent(&reg, "r"), 0);
    assert_eq!(reg.get_index("r").unwrap().total_tokens, 0);

    papers.upsert(Arc::new(Record::new("p", EntryType::Paper).with_field(words("new", 10)))).unwrap();
    let stats = reg.rebuild_index("r", &collections).unwrap();
    assert_eq!((stats.papers, stats.chunks, stats.tokens), (1, 1, 10));
    assert_eq!(reg.get_index("r").unwrap().total_tokens, 10);
}

#[test]
fn metadata_survives_a_fresh_registry() {
    let tmp = TempDir::new().unwrap();
    let created = {
        let reg = open(&tmp, Arc::new(CountingProvider::default()));
        reg.create_index("keep", "nova", Some(512), 250, 25).unwrap();
        reg.add_entry_to_index("keep", "k", EntryType::Paper, &words("w", 30)).unwrap();
        reg.get_index("keep").unwrap()
    };
    let reg = open(&tmp, Arc::new(CountingProvider::default()));
    let loaded = reg.get_index("keep").unwrap();
    assert_eq!(loaded.created_at, created.created_at);
    assert_eq!(loaded.updated_at, created.updated_at);
    assert_eq!((loaded.dimensions, loaded.chunk_size, loaded.chunk_overlap), (512, 250, 25));
    assert_eq!((loaded.chunk_count, loaded.total_tokens), (created.chunk_count, created.total_tokens));
    assert!((loaded.estimated_cost - created.estimated_cost).abs() < 1e-12);
    assert_eq!(reg.model_name_for_index("keep").unwrap(), "nova");
    assert_eq!(assert_consistent(&reg, "keep"), 1);
}

#[test]
fn fan_out_isolates_failing_indices() {
    let tmp = TempDir::new().unwrap();
    let reg = open(&tmp, Arc::new(CountingProvider::default()));
    reg.create_index("good", "titan-v2", None, 300, 50).unwrap();
    reg.create_index("broken", "nova", Some(256), 300, 50).unwrap();
    std::fs::remove_file(reg.layout().chunks_file("broken")).unwrap();

    let added = reg.update_all_indices_with_entry("x", EntryType::Book, "a few words here");
    assert_eq!(added.len(), 2);
    assert_eq!(added["good"].as_ref().unwrap().chunks, 1);
    assert!(matches!(added["broken"], Err(Error::NamedIndexNotFound(_))));

    let removed = reg.remove_entry_from_all_indices("x");
    assert_eq!(*removed["good"].as_ref().unwrap(), 1);
    assert!(removed["broken"].is_err());
}
