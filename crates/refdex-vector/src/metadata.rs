use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration and running totals of one named vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,
    /// Provider model id, e.g. `amazon.titan-embed-text-v2:0`.
    #[serde(rename = "embedding_model")]
    pub embedding_model_id: String,
    pub dimensions: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunk_count: usize,
    pub total_tokens: usize,
    #[serde(rename = "estimated_cost_usd")]
    pub estimated_cost: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexMetadata {
    pub fn new(name: &str, embedding_model_id: &str, dimensions: usize, chunk_size: usize, chunk_overlap: usize) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            embedding_model_id: embedding_model_id.to_string(),
            dimensions,
            chunk_size,
            chunk_overlap,
            chunk_count: 0,
            total_tokens: 0,
            estimated_cost: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy with new totals and a fresh `updated_at`.
    pub fn with_stats(&self, chunk_count: usize, total_tokens: usize, estimated_cost: f64) -> Self {
        Self { chunk_count, total_tokens, estimated_cost, updated_at: Utc::now(), ..self.clone() }
    }
}

/// Outcome of adding one entry to an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndexUpdateStats {
    pub chunks: usize,
    pub tokens: usize,
    pub cost: f64,
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RebuildStats {
    pub papers: usize,
    pub books: usize,
    pub media: usize,
    pub chunks: usize,
    pub tokens: usize,
    pub cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_stored_field_names() {
        let m = IndexMetadata::new("nova-256", "amazon.nova", 256, 300, 50);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["embedding_model"], "amazon.nova");
        assert_eq!(json["estimated_cost_usd"], 0.0);
        let back: IndexMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn with_stats_keeps_identity() {
        let m = IndexMetadata::new("a", "m", 8, 300, 50);
        let u = m.with_stats(4, 100, 0.5);
        assert_eq!(u.created_at, m.created_at);
        assert!(u.updated_at >= m.updated_at);
        assert_eq!((u.chunk_count, u.total_tokens), (4, 100));
        assert_eq!(u.name, "a");
    }
}
