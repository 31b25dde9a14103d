use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("Vector index '{0}' not found. Create it with create_index() and build it with rebuild_index().")]
    NamedIndexNotFound(String),

    #[error("Vector index '{0}' already exists. Delete it first or use a different name.")]
    IndexExists(String),

    #[error("Failed to load {collection} search index: {reason}. Run rebuild_index() for {collection}.")]
    IndexLoad { collection: String, reason: String },

    #[error("Failed to generate embedding with {model}: {message}. Check the embedding endpoint and that the model is enabled for your account.")]
    Embedding { model: String, message: String },

    #[error("Embedding credentials rejected for {model}: {message}. Set REFDEX_EMBEDDING__API_KEY (or AWS_BEARER_TOKEN_BEDROCK) to a key allowed to invoke this model.")]
    EmbeddingAuth { model: String, message: String },

    #[error("Vector index '{index}' was built with {index_model}, but {requested} was requested. Query with the index's model or rebuild the index.")]
    ModelMismatch { index: String, index_model: String, requested: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound { kind: kind.into(), id: id.into() }
    }

    pub fn embedding(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding { model: model.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
