//! Embedding models known to the index registry.

use refdex_core::error::{Error, Result};

/// Request/response dialect spoken by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Titan,
    Cohere,
    Nova,
    Local,
}

/// Static description of one embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Short name used in configuration and index metadata lookups.
    pub name: &'static str,
    pub model_id: &'static str,
    pub family: ModelFamily,
    pub default_dimensions: usize,
    /// `None` means the output width is fixed at `default_dimensions`.
    pub supported_dimensions: Option<&'static [usize]>,
    pub max_input_tokens: usize,
    pub chars_per_token: f64,
    pub price_per_1000_tokens: f64,
}

pub const DEFAULT_MODEL: &str = "titan-v2";

const BEDROCK_CHARS_PER_TOKEN: f64 = 4.7;

pub static MODELS: [ModelConfig; 6] = [
    ModelConfig {
        name: "titan-v1",
        model_id: "amazon.titan-embed-text-v1",
        family: ModelFamily::Titan,
        default_dimensions: 1536,
        supported_dimensions: None,
        max_input_tokens: 8192,
        chars_per_token: BEDROCK_CHARS_PER_TOKEN,
        price_per_1000_tokens: 0.0001,
    },
    ModelConfig {
        name: "titan-v2",
        model_id: "amazon.titan-embed-text-v2:0",
        family: ModelFamily::Titan,
        default_dimensions: 1024,
        supported_dimensions: None,
        max_input_tokens: 8192,
        chars_per_token: BEDROCK_CHARS_PER_TOKEN,
        price_per_1000_tokens: 0.00002,
    },
    ModelConfig {
        name: "cohere-en",
        model_id: "cohere.embed-english-v3",
        family: ModelFamily::Cohere,
        default_dimensions: 1024,
        supported_dimensions: None,
        max_input_tokens: 512,
        chars_per_token: BEDROCK_CHARS_PER_TOKEN,
        price_per_1000_tokens: 0.0001,
    },
    ModelConfig {
        name: "cohere-multi",
        model_id: "cohere.embed-multilingual-v3",
        family: ModelFamily::Cohere,
        default_dimensions: 1024,
        supported_dimensions: None,
        max_input_tokens: 512,
        chars_per_token: BEDROCK_CHARS_PER_TOKEN,
        price_per_1000_tokens: 0.0001,
    },
    ModelConfig {
        name: "nova",
        model_id: "amazon.nova-2-multimodal-embeddings-v1:0",
        family: ModelFamily::Nova,
        default_dimensions: 1024,
        supported_dimensions: Some(&[256, 512, 1024, 3072]),
        max_input_tokens: 8000,
        chars_per_token: BEDROCK_CHARS_PER_TOKEN,
        price_per_1000_tokens: 0.00001,
    },
    ModelConfig {
        name: "bge-m3",
        model_id: "local/bge-m3",
        family: ModelFamily::Local,
        default_dimensions: 1024,
        supported_dimensions: None,
        max_input_tokens: 512,
        chars_per_token: 4.0,
        price_per_1000_tokens: 0.0,
    },
];

impl ModelConfig {
    /// Character budget derived from the token limit.
    pub fn max_chars(&self) -> usize {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let chars = (self.max_input_tokens as f64 * self.chars_per_token) as usize;
        chars
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn cost_for_tokens(&self, tokens: usize) -> f64 {
        tokens as f64 / 1000.0 * self.price_per_1000_tokens
    }
}

pub fn model_names() -> impl Iterator<Item = &'static str> {
    MODELS.iter().map(|m| m.name)
}

pub fn get_model_config(name: &str) -> Result<&'static ModelConfig> {
    MODELS.iter().find(|m| m.name == name).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "Unknown embedding model: '{name}'. Valid models: {}",
            model_names().collect::<Vec<_>>().join(", ")
        ))
    })
}

/// Catalog entry for a provider model id, as stored in index metadata.
pub fn model_for_id(model_id: &str) -> Option<&'static ModelConfig> {
    MODELS.iter().find(|m| m.model_id == model_id)
}

/// Resolves the output width for `name`, rejecting overrides the model
/// cannot produce.
pub fn validate_dimensions(name: &str, dimensions: Option<usize>) -> Result<usize> {
    let config = get_model_config(name)?;
    let Some(dims) = dimensions else {
        return Ok(config.default_dimensions);
    };
    match config.supported_dimensions {
        None if dims != config.default_dimensions => Err(Error::InvalidConfig(format!(
            "Model '{name}' has fixed dimensions: {}. Cannot use dimensions={dims}.",
            config.default_dimensions
        ))),
        Some(supported) if !supported.contains(&dims) => Err(Error::InvalidConfig(format!(
            "Model '{name}' supports dimensions: {}. Cannot use dimensions={dims}.",
            supported.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ))),
        _ => Ok(dims),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_rules() {
        assert_eq!(validate_dimensions("titan-v2", None).unwrap(), 1024);
        assert_eq!(validate_dimensions("titan-v1", Some(1536)).unwrap(), 1536);
        assert!(validate_dimensions("titan-v2", Some(512)).is_err());
        assert_eq!(validate_dimensions("nova", Some(256)).unwrap(), 256);
        assert!(validate_dimensions("nova", Some(300)).is_err());
        assert!(validate_dimensions("gpt", None).is_err());
    }

    #[test]
    fn reverse_lookup_and_budget() {
        assert_eq!(model_for_id("cohere.embed-english-v3").map(|m| m.name), Some("cohere-en"));
        assert!(model_for_id("unknown").is_none());
        assert_eq!(get_model_config("cohere-en").unwrap().max_chars(), 2406);
        let titan = get_model_config("titan-v2").unwrap();
        assert!((titan.cost_for_tokens(50_000) - 0.001).abs() < 1e-12);
    }
}
