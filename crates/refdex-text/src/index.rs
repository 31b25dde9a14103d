use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tracing::{debug, info, warn};

use refdex_core::error::{Error, Result};
use refdex_core::fragments::extract_fragments;
use refdex_core::traits::{Collection, Entry, LexicalRanker};
use refdex_core::types::{EntryType, LexicalDocument, RankedDocument, SearchOptions, SearchResult};

use crate::ranker::TantivyRanker;

/// Persisted keyword index over one collection.
///
/// The index is rebuilt wholesale from the collection; it is never
/// updated in place. A missing index is rebuilt on first search.
pub struct LexicalIndex<R: LexicalRanker = TantivyRanker> {
	entry_type: EntryType,
	collection: Arc<dyn Collection>,
	index_dir: PathBuf,
	cached: Mutex<Option<Arc<R>>>,
}

impl<R: LexicalRanker> LexicalIndex<R> {
	pub fn new(collection: Arc<dyn Collection>, index_dir: impl Into<PathBuf>) -> Self {
		Self { entry_type: collection.entry_type(), collection, index_dir: index_dir.into(), cached: Mutex::new(None) }
	}

	pub fn entry_type(&self) -> EntryType {
		self.entry_type
	}

	pub fn index_dir(&self) -> &Path {
		&self.index_dir
	}

	pub fn needs_rebuild(&self) -> bool {
		!self.index_dir.exists()
	}

	/// Drops the cached reader; the next search reopens from disk.
	pub fn invalidate(&self) {
		*self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
	}

	/// Re-indexes every entry with searchable text and returns how many
	/// were indexed. An empty collection removes the persisted index.
	pub fn rebuild_index(&self) -> Result<usize> {
		let name = self.entry_type.collection_name();
		info!(collection = name, "rebuilding search index");
		self.invalidate();

		let documents: Vec<LexicalDocument> = self
			.collection
			.list_all()?
			.into_iter()
			.filter_map(|e| {
				let content = e.searchable_text();
				(!content.trim().is_empty()).then(|| LexicalDocument { id: e.id().to_string(), content })
			})
			.collect();

		if documents.is_empty() {
			warn!(collection = name, "no searchable content to index");
			if self.index_dir.exists() {
				std::fs::remove_dir_all(&self.index_dir)?;
			}
			return Ok(0);
		}

		if let Some(parent) = self.index_dir.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let ranker = R::build(&documents, Some(&self.index_dir))
			.with_context(|| format!("building {name} search index at {}", self.index_dir.display()))?;
		*self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(ranker));
		info!(collection = name, indexed = documents.len(), "search index rebuilt");
		Ok(documents.len())
	}

	fn open(&self) -> anyhow::Result<Arc<R>> {
		let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(ranker) = cached.as_ref() {
			return Ok(Arc::clone(ranker));
		}
		if self.needs_rebuild() {
			anyhow::bail!("index not found at {}", self.index_dir.display());
		}
		let ranker = Arc::new(R::open(&self.index_dir)?);
		*cached = Some(Arc::clone(&ranker));
		Ok(ranker)
	}

	/// Loaded ranker, rebuilding once if the index is missing or unreadable.
	/// `None` when the collection has nothing to index.
	fn ranker(&self) -> Result<Option<Arc<R>>> {
		match self.open() {
			Ok(r) => return Ok(Some(r)),
			Err(e) => debug!(collection = self.entry_type.collection_name(), error = %e, "search index unavailable, rebuilding"),
		}
		if self.rebuild_index()? == 0 {
			return Ok(None);
		}
		self.open().map(Some).map_err(|e| Error::IndexLoad {
			collection: self.entry_type.collection_name().to_string(),
			reason: e.to_string(),
		})
	}

	/// Ranks entries against `query`. With `entry_id`, scores just that
	/// entry and returns at most one result.
	pub fn search(&self, query: &str, entry_id: Option<&str>, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
		info!(collection = self.entry_type.collection_name(), query, "keyword search");
		if let Some(id) = entry_id {
			return self.search_single_entry(query, id, opts);
		}
		if opts.top_k == 0 {
			return Ok(Vec::new());
		}

		let Some(ranker) = self.ranker()? else {
			return Ok(Vec::new());
		};
		let k = opts.top_k.min(ranker.num_documents());
		if k == 0 {
			return Ok(Vec::new());
		}

		let hits = ranker.query(query, k).map_err(Error::Other)?;
		let terms: Vec<&str> = query.split_whitespace().collect();
		let results: Vec<SearchResult> = hits
			.into_iter()
			.filter(|h| h.score > 0.0)
			.take(opts.top_k)
			.map(|hit| {
				let entry = match self.collection.get(&hit.id) {
					Ok(entry) => entry,
					Err(e) => {
						warn!(entry_id = %hit.id, error = %e, "could not resolve indexed entry");
						None
					}
				};
				self.to_result(hit, entry, &terms, opts)
			})
			.collect();
		info!(found = results.len(), "keyword search finished");
		Ok(results)
	}

	fn search_single_entry(&self, query: &str, entry_id: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
		let entry = self.collection.get(entry_id)?.ok_or_else(|| Error::not_found(capitalized(self.entry_type), entry_id))?;
		let content = entry.searchable_text();
		if content.trim().is_empty() {
			return Ok(Vec::new());
		}

		let doc = LexicalDocument { id: entry_id.to_string(), content };
		let ranker = R::build(std::slice::from_ref(&doc), None).map_err(Error::Other)?;
		let hit = ranker.query(query, 1).map_err(Error::Other)?.into_iter().next();
		let terms: Vec<&str> = query.split_whitespace().collect();
		Ok(hit
			.filter(|h| h.score > 0.0)
			.map(|h| self.to_result(h, Some(entry), &terms, opts))
			.into_iter()
			.collect())
	}

	fn to_result(&self, hit: RankedDocument, entry: Option<Arc<dyn Entry>>, terms: &[&str], opts: &SearchOptions) -> SearchResult {
		let fragments = if opts.want_fragments {
			extract_fragments(&hit.content, terms, opts.context_lines, opts.max_fragments)
		} else {
			Vec::new()
		};
		SearchResult {
			entry_id: hit.id,
			score: hit.score,
			matched_content: hit.content,
			entry_type: self.entry_type,
			entry,
			fragments,
		}
	}
}

fn capitalized(entry_type: EntryType) -> String {
	let s = entry_type.as_str();
	let mut chars = s.chars();
	chars.next().map(|c| c.to_uppercase().chain(chars).collect()).unwrap_or_default()
}
