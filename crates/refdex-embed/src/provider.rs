//! Resolves a catalog model to a live embedder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use refdex_core::config::EmbeddingSettings;
use refdex_core::error::{Error, Result};
use refdex_core::traits::Embedder;

use crate::bedrock::BedrockEmbedder;
use crate::catalog::{ModelConfig, ModelFamily};
use crate::fake::FakeEmbedder;

pub const FAKE_EMBEDDINGS_ENV: &str = "REFDEX_USE_FAKE_EMBEDDINGS";

/// Hands out embedders bound to one `(model, dimensions)` pair.
pub trait EmbeddingProvider: Send + Sync {
    fn embedder(&self, model: &'static ModelConfig, dimensions: usize) -> Result<Arc<dyn Embedder>>;
}

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.use_fake_embeddings
        || std::env::var(FAKE_EMBEDDINGS_ENV)
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

/// Bedrock for remote models, candle for `bge-m3` when built with `local`,
/// fakes when configured. Embedders are cached per `(model_id, dimensions)`.
pub struct DefaultEmbeddingProvider {
    settings: EmbeddingSettings,
    cache: Mutex<HashMap<(String, usize), Arc<dyn Embedder>>>,
}

impl DefaultEmbeddingProvider {
    pub fn new(settings: EmbeddingSettings) -> Self {
        Self { settings, cache: Mutex::new(HashMap::new()) }
    }

    pub fn settings(&self) -> &EmbeddingSettings {
        &self.settings
    }

    fn create(&self, model: &'static ModelConfig, dimensions: usize) -> Result<Arc<dyn Embedder>> {
        if fake_requested(&self.settings) {
            info!(model = model.model_id, dimensions, "using fake embedder");
            return Ok(Arc::new(FakeEmbedder::new(model.model_id, dimensions, model.max_input_tokens)));
        }
        match model.family {
            ModelFamily::Local => local_embedder(model),
            _ => Ok(Arc::new(BedrockEmbedder::new(model, dimensions, &self.settings)?)),
        }
    }
}

#[cfg(feature = "local")]
fn local_embedder(model: &'static ModelConfig) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(crate::local::LocalEmbedder::load(model)?))
}

#[cfg(not(feature = "local"))]
fn local_embedder(model: &'static ModelConfig) -> Result<Arc<dyn Embedder>> {
    Err(Error::InvalidConfig(format!(
        "Model '{}' runs locally but refdex-embed was built without the 'local' feature",
        model.name
    )))
}

impl EmbeddingProvider for DefaultEmbeddingProvider {
    fn embedder(&self, model: &'static ModelConfig, dimensions: usize) -> Result<Arc<dyn Embedder>> {
        let key = (model.model_id.to_string(), dimensions);
        let mut cache = self.cache.lock().map_err(|_| Error::Operation("embedder cache lock poisoned".into()))?;
        if let Some(e) = cache.get(&key) {
            return Ok(Arc::clone(e));
        }
        let embedder = self.create(model, dimensions)?;
        cache.insert(key, Arc::clone(&embedder));
        Ok(embedder)
    }
}

/// Always returns deterministic [`FakeEmbedder`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeEmbeddingProvider;

impl EmbeddingProvider for FakeEmbeddingProvider {
    fn embedder(&self, model: &'static ModelConfig, dimensions: usize) -> Result<Arc<dyn Embedder>> {
        Ok(Arc::new(FakeEmbedder::new(model.model_id, dimensions, model.max_input_tokens)))
    }
}
