use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use refdex_core::collection::Collections;
use refdex_core::error::Result;
use refdex_core::traits::LexicalRanker;
use refdex_core::types::{sort_by_score, EntryType, SearchOptions, SearchResult};

use crate::index::LexicalIndex;
use crate::ranker::TantivyRanker;

/// Keyword search across the paper, book and media indexes.
pub struct CombinedLexicalSearch<R: LexicalRanker = TantivyRanker> {
	papers: LexicalIndex<R>,
	books: LexicalIndex<R>,
	media: LexicalIndex<R>,
}

impl<R: LexicalRanker> CombinedLexicalSearch<R> {
	/// One index per collection under `search_index_dir/<collection>`.
	pub fn new(collections: &Collections, search_index_dir: &Path) -> Self {
		let index = |t: EntryType| LexicalIndex::new(collections.get(t).clone(), search_index_dir.join(t.collection_name()));
		Self { papers: index(EntryType::Paper), books: index(EntryType::Book), media: index(EntryType::Media) }
	}

	pub fn index(&self, entry_type: EntryType) -> &LexicalIndex<R> {
		match entry_type {
			EntryType::Paper => &self.papers,
			EntryType::Book => &self.books,
			EntryType::Media => &self.media,
		}
	}

	pub fn rebuild_all_indices(&self) -> Result<BTreeMap<EntryType, usize>> {
		info!("rebuilding all search indexes");
		EntryType::ALL.iter().map(|&t| Ok((t, self.index(t).rebuild_index()?))).collect()
	}

	/// Rebuilds only the indexes missing on disk; returns their counts.
	pub fn ensure_all_indices_current(&self) -> Result<BTreeMap<EntryType, usize>> {
		let mut rebuilt = BTreeMap::new();
		for t in EntryType::ALL {
			let index = self.index(t);
			if index.needs_rebuild() {
				rebuilt.insert(t, index.rebuild_index()?);
			}
		}
		Ok(rebuilt)
	}

	pub fn search_collection(
		&self,
		entry_type: EntryType,
		query: &str,
		entry_id: Option<&str>,
		opts: &SearchOptions,
	) -> Result<Vec<SearchResult>> {
		self.index(entry_type).search(query, entry_id, opts)
	}

	/// Searches each requested collection with the full `top_k`, then keeps
	/// the best `top_k` overall. A collection that fails is skipped.
	pub fn search(&self, query: &str, opts: &SearchOptions, entry_types: &[EntryType]) -> Vec<SearchResult> {
		info!(query, "combined keyword search");
		let mut all = Vec::new();
		for &t in entry_types {
			match self.index(t).search(query, None, opts) {
				Ok(results) => all.extend(results),
				Err(e) => warn!(collection = t.collection_name(), error = %e, "skipping collection in combined search"),
			}
		}
		sort_by_score(&mut all);
		all.truncate(opts.top_k);
		all
	}
}
