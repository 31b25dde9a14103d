use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use refdex_core::error::{Error, Result};
use refdex_core::traits::{DocumentEmbedding, Embedder};

/// Deterministic hashed bag-of-words vectors, L2-normalized.
///
/// Texts sharing words land near each other, which is enough for tests
/// and offline development. Token count is the word count.
pub struct FakeEmbedder {
    model_id: String,
    dim: usize,
    max_input_tokens: usize,
}

impl FakeEmbedder {
    pub fn new(model_id: impl Into<String>, dim: usize, max_input_tokens: usize) -> Self {
        Self { model_id: model_id.into(), dim: dim.max(1), max_input_tokens }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    fn embed_document(&self, text: &str) -> Result<DocumentEmbedding> {
        if text.trim().is_empty() {
            return Err(Error::embedding(&self.model_id, "Input text cannot be empty"));
        }
        Ok(DocumentEmbedding { vector: self.vector(text), token_count: text.split_whitespace().count() })
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_document(text)?.vector)
    }
}
