//! Embedding models for the vector index registry.

pub mod batch;
pub mod bedrock;
pub mod catalog;
pub mod fake;
#[cfg(feature = "local")]
pub mod local;
pub mod provider;
pub mod stats;

pub use batch::{embed_documents, BatchEmbeddings, BatchOptions};
pub use bedrock::BedrockEmbedder;
pub use catalog::{get_model_config, model_for_id, validate_dimensions, ModelConfig, ModelFamily, DEFAULT_MODEL};
pub use fake::FakeEmbedder;
pub use provider::{DefaultEmbeddingProvider, EmbeddingProvider, FakeEmbeddingProvider};
pub use stats::EmbeddingStats;
