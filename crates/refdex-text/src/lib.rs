//! refdex-text
//!
//! Tantivy-backed keyword search: one persisted index per collection plus a
//! combined search over all three.
pub mod combined;
pub mod index;
pub mod ranker;
pub mod tantivy_utils;

pub use combined::CombinedLexicalSearch;
pub use index::LexicalIndex;
pub use ranker::TantivyRanker;
