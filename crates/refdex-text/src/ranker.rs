use std::path::{Path, PathBuf};

use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::{doc, Index, IndexReader, TantivyDocument};

use refdex_core::traits::LexicalRanker;
use refdex_core::types::{LexicalDocument, RankedDocument};

use crate::tantivy_utils::{build_schema, register_tokenizer, Fields};

const WRITER_HEAP: usize = 50_000_000;

/// BM25 ranking over a tantivy index, on disk or in RAM.
pub struct TantivyRanker {
	index: Index,
	reader: IndexReader,
	fields: Fields,
}

impl TantivyRanker {
	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = Fields::from_schema(&index.schema())?;
		let reader = index.reader()?;
		Ok(Self { index, reader, fields })
	}

	fn write_documents(index: &Index, fields: Fields, documents: &[LexicalDocument]) -> Result<()> {
		register_tokenizer(index);
		let mut index_writer = index.writer_with_num_threads(1, WRITER_HEAP)?;
		for (ordinal, d) in documents.iter().enumerate() {
			index_writer.add_document(doc!(
				fields.id => d.id.clone(),
				fields.ordinal => ordinal as u64,
				fields.content => d.content.clone(),
			))?;
		}
		index_writer.commit()?;
		index_writer.wait_merging_threads()?;
		Ok(())
	}

	/// Builds next to `dir` and swaps the finished index into place so a
	/// failed build leaves the previous index untouched.
	fn build_in_dir(documents: &[LexicalDocument], dir: &Path) -> Result<Self> {
		let staging = staging_dir(dir);
		if staging.exists() { std::fs::remove_dir_all(&staging)?; }
		std::fs::create_dir_all(&staging)?;
		let schema = build_schema();
		let index = Index::create_in_dir(&staging, schema.clone())?;
		Self::write_documents(&index, Fields::from_schema(&schema)?, documents)?;
		drop(index);

		if dir.exists() { std::fs::remove_dir_all(dir)?; }
		std::fs::rename(&staging, dir)?;
		Self::open(dir)
	}
}

fn staging_dir(dir: &Path) -> PathBuf {
	let mut name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(".tmp");
	dir.with_file_name(name)
}

impl LexicalRanker for TantivyRanker {
	fn build(documents: &[LexicalDocument], location: Option<&Path>) -> Result<Self> {
		match location {
			Some(dir) => Self::build_in_dir(documents, dir),
			None => {
				let schema = build_schema();
				let index = Index::create_in_ram(schema.clone());
				Self::write_documents(&index, Fields::from_schema(&schema)?, documents)?;
				Self::from_index(index)
			}
		}
	}

	fn open(location: &Path) -> Result<Self> {
		let index = Index::open_in_dir(location)?;
		Self::from_index(index)
	}

	fn query(&self, text: &str, k: usize) -> Result<Vec<RankedDocument>> {
		if k == 0 || text.trim().is_empty() {
			return Ok(Vec::new());
		}
		let searcher = self.reader.searcher();
		let qp = QueryParser::for_index(&self.index, vec![self.fields.content]);
		let (q, _errors) = qp.parse_query_lenient(text);
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k))?;

		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let id = doc.get_first(self.fields.id).and_then(|v| v.as_str()).unwrap_or("").to_string();
			let content = doc.get_first(self.fields.content).and_then(|v| v.as_str()).unwrap_or("").to_string();
			let ordinal = doc.get_first(self.fields.ordinal).and_then(|v| v.as_u64()).unwrap_or(u64::MAX);
			hits.push((ordinal, RankedDocument { id, content, score }));
		}
		hits.sort_by(|(oa, a), (ob, b)| b.score.total_cmp(&a.score).then(oa.cmp(ob)));
		Ok(hits.into_iter().map(|(_, h)| h).collect())
	}

	fn num_documents(&self) -> usize {
		self.reader.searcher().num_docs() as usize
	}
}
