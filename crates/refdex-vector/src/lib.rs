//! Named vector indices and semantic search.
//!
//! A registry holds any number of independently configured indices (model,
//! dimensions, chunk parameters). [`VectorSearch`] queries one of them.

pub mod flat;
pub mod layout;
pub mod metadata;
pub mod registry;
pub mod search;

pub use flat::FlatIndex;
pub use metadata::{IndexMetadata, IndexUpdateStats, RebuildStats};
pub use registry::{FanOut, VectorIndexRegistry};
pub use search::{aggregate_by_entry, VectorSearch};
