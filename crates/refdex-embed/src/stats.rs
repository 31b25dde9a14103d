use serde::{Deserialize, Serialize};

use crate::catalog::ModelConfig;

/// Token usage and cost of one embedding batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total_tokens: usize,
    pub total_cost: f64,
    pub num_texts: usize,
}

impl EmbeddingStats {
    pub fn from_tokens(model: &ModelConfig, total_tokens: usize, num_texts: usize) -> Self {
        Self { total_tokens, total_cost: model.cost_for_tokens(total_tokens), num_texts }
    }

    pub fn merge(&mut self, other: &EmbeddingStats) {
        self.total_tokens += other.total_tokens;
        self.total_cost += other.total_cost;
        self.num_texts += other.num_texts;
    }
}
