//! BGE-M3 running in-process on candle.
//!
//! Model files (`tokenizer.json`, `config.json`, `pytorch_model.bin`) are
//! looked up in `REFDEX_MODEL_DIR`, `MODEL_DIR`, then `models/bge-m3`.

pub mod device;
pub mod pool;
pub mod tokenize;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result as AnyResult};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::info;

use refdex_core::error::{Error, Result};
use refdex_core::traits::{DocumentEmbedding, Embedder};

use crate::catalog::ModelConfig;

pub use pool::masked_mean_l2;

pub struct LocalEmbedder {
    model_config: &'static ModelConfig,
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalEmbedder {
    pub fn load(model_config: &'static ModelConfig) -> Result<Self> {
        Self::load_inner(model_config).map_err(|e| Error::embedding(model_config.model_id, e.to_string()))
    }

    fn load_inner(model_config: &'static ModelConfig) -> AnyResult<Self> {
        let device = device::select_device();
        let model_dir = resolve_model_dir()?;
        info!(dir = %model_dir.display(), "loading local embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(model_dir.join("config.json"))?)?;
        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("local embedding model loaded");
        Ok(Self { model_config, model, tokenizer, device })
    }

    fn embed_inner(&self, text: &str) -> AnyResult<DocumentEmbedding> {
        let max_len = self.model_config.max_input_tokens;
        let (input_ids, attention_mask, tokens) =
            tokenize::tokenize_on_device(&self.tokenizer, text, max_len, &self.device)?;
        let token_type_ids = Tensor::zeros((1, max_len), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vector: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        Ok(DocumentEmbedding { vector, token_count: tokens })
    }
}

impl Embedder for LocalEmbedder {
    fn model_id(&self) -> &str {
        self.model_config.model_id
    }

    fn dimensions(&self) -> usize {
        self.model_config.default_dimensions
    }

    fn max_input_tokens(&self) -> usize {
        self.model_config.max_input_tokens
    }

    fn embed_document(&self, text: &str) -> Result<DocumentEmbedding> {
        if text.trim().is_empty() {
            return Err(Error::embedding(self.model_config.model_id, "Input text cannot be empty"));
        }
        self.embed_inner(text).map_err(|e| Error::embedding(self.model_config.model_id, e.to_string()))
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_document(text)?.vector)
    }
}

fn resolve_model_dir() -> AnyResult<PathBuf> {
    for var in ["REFDEX_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                return Ok(p);
            }
        }
    }
    for candidate in ["models/bge-m3", "../models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() {
            return Ok(p.to_path_buf());
        }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory; set REFDEX_MODEL_DIR"))
}
