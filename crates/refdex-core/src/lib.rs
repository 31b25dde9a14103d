pub mod chunking;
pub mod collection;
pub mod config;
pub mod error;
pub mod fragments;
pub mod logging;
pub mod traits;
pub mod types;

pub use chunking::{CharacterLimitChunker, Chunker, ChunkingConfig};
pub use collection::{Collections, MemoryCollection};
pub use error::{Error, Result};
pub use fragments::extract_fragments;
pub use traits::{Collection, DocumentEmbedding, Embedder, Entry, LexicalRanker, VectorIndex};
pub use types::{
    sort_by_score, Chunk, EntryType, Fragment, LexicalDocument, RankedDocument, Record, SearchOptions, SearchResult,
};
