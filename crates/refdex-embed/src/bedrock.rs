//! Bedrock runtime embedding client.
//!
//! Calls `POST {endpoint}/model/{model_id}/invoke` with a bearer API key.
//! Each model family has its own request and response JSON shape.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use refdex_core::config::EmbeddingSettings;
use refdex_core::error::{Error, Result};
use refdex_core::traits::{DocumentEmbedding, Embedder};

use crate::catalog::{ModelConfig, ModelFamily};

pub const API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// What the vector will be used for. Nova and Cohere embed differently for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Document,
    Query,
}

pub struct BedrockEmbedder {
    model: &'static ModelConfig,
    dimensions: usize,
    client: Client,
    url: String,
    api_key: String,
}

impl BedrockEmbedder {
    pub fn new(model: &'static ModelConfig, dimensions: usize, settings: &EmbeddingSettings) -> Result<Self> {
        if model.family == ModelFamily::Local {
            return Err(Error::InvalidConfig(format!("'{}' is a local model, not a Bedrock model", model.name)));
        }
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| Error::EmbeddingAuth {
                model: model.model_id.to_string(),
                message: "no API key configured".into(),
            })?;
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", settings.region));
        let url = format!("{}/model/{}/invoke", base.trim_end_matches('/'), model.model_id);
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::embedding(model.model_id, format!("failed to create HTTP client: {e}")))?;
        Ok(Self { model, dimensions, client, url, api_key })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn embed(&self, text: &str, purpose: Purpose) -> Result<DocumentEmbedding> {
        if text.trim().is_empty() {
            return Err(Error::embedding(self.model.model_id, "Input text cannot be empty"));
        }
        let text = truncate_chars(text, self.model.max_chars());

        let body = request_body(self.model.family, self.dimensions, text, purpose);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::embedding(self.model.model_id, format!("request timed out after {REQUEST_TIMEOUT:?}"))
                } else {
                    Error::embedding(self.model.model_id, format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        let payload = response
            .text()
            .map_err(|e| Error::embedding(self.model.model_id, format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(classify_failure(self.model.model_id, status, &payload));
        }

        let value: Value = serde_json::from_str(&payload)?;
        let (vector, token_count) = parse_response(self.model.family, &value, text.chars().count())
            .ok_or_else(|| Error::embedding(self.model.model_id, "unexpected response shape"))?;
        debug!(model = self.model.model_id, dims = vector.len(), tokens = token_count, "generated embedding");
        Ok(DocumentEmbedding { vector, token_count })
    }
}

impl Embedder for BedrockEmbedder {
    fn model_id(&self) -> &str {
        self.model.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_tokens(&self) -> usize {
        self.model.max_input_tokens
    }

    fn embed_document(&self, text: &str) -> Result<DocumentEmbedding> {
        self.embed(text, Purpose::Document)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text, Purpose::Query)?.vector)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            warn!(from = text.chars().count(), to = max_chars, "text truncated for embedding");
            &text[..byte_idx]
        }
        None => text,
    }
}

pub fn request_body(family: ModelFamily, dimensions: usize, text: &str, purpose: Purpose) -> Value {
    match family {
        ModelFamily::Cohere => {
            let input_type = match purpose {
                Purpose::Query => "search_query",
                Purpose::Document => "search_document",
            };
            json!({ "texts": [text], "input_type": input_type })
        }
        ModelFamily::Nova => {
            let embedding_purpose = match purpose {
                Purpose::Query => "TEXT_RETRIEVAL",
                Purpose::Document => "GENERIC_INDEX",
            };
            json!({
                "schemaVersion": "nova-multimodal-embed-v1",
                "taskType": "SINGLE_EMBEDDING",
                "singleEmbeddingParams": {
                    "embeddingPurpose": embedding_purpose,
                    "embeddingDimension": dimensions,
                    "text": { "truncationMode": "END", "value": text },
                },
            })
        }
        ModelFamily::Titan | ModelFamily::Local => json!({ "inputText": text }),
    }
}

/// Vector and billed token count. Nova does not report tokens, so they are
/// estimated at four characters each.
pub fn parse_response(family: ModelFamily, body: &Value, text_chars: usize) -> Option<(Vec<f32>, usize)> {
    let (embedding, tokens) = match family {
        ModelFamily::Cohere => (
            body.get("embeddings")?.get(0)?,
            body.pointer("/meta/billed_units/input_tokens").and_then(Value::as_u64).unwrap_or(0) as usize,
        ),
        ModelFamily::Nova => (body.get("embeddings")?.get(0)?.get("embedding")?, text_chars / 4),
        ModelFamily::Titan | ModelFamily::Local => (
            body.get("embedding")?,
            body.get("inputTextTokenCount").and_then(Value::as_u64).unwrap_or(0) as usize,
        ),
    };
    let vector = embedding.as_array()?.iter().map(|v| v.as_f64().map(|f| f as f32)).collect::<Option<Vec<f32>>>()?;
    Some((vector, tokens))
}

fn classify_failure(model_id: &str, status: StatusCode, payload: &str) -> Error {
    let auth_markers = ["AccessDenied", "ExpiredToken", "UnrecognizedClient"];
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) || auth_markers.iter().any(|m| payload.contains(m)) {
        let message = if payload.contains("ExpiredToken") {
            "API key or session token expired".to_string()
        } else {
            format!("access denied (HTTP {}); the key needs permission to invoke this model in this region", status.as_u16())
        };
        return Error::EmbeddingAuth { model: model_id.to_string(), message };
    }
    let snippet: String = payload.chars().take(300).collect();
    Error::embedding(model_id, format!("HTTP {}: {snippet}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::get_model_config;

    #[test]
    fn nova_request_carries_purpose_and_dimensions() {
        let body = request_body(ModelFamily::Nova, 256, "hello", Purpose::Query);
        assert_eq!(body["singleEmbeddingParams"]["embeddingPurpose"], "TEXT_RETRIEVAL");
        assert_eq!(body["singleEmbeddingParams"]["embeddingDimension"], 256);
        assert_eq!(body["singleEmbeddingParams"]["text"]["value"], "hello");
        let doc = request_body(ModelFamily::Cohere, 1024, "hello", Purpose::Document);
        assert_eq!(doc["input_type"], "search_document");
        assert_eq!(request_body(ModelFamily::Titan, 1024, "hi", Purpose::Query), json!({"inputText": "hi"}));
    }

    #[test]
    fn responses_parse_per_family() {
        let titan = json!({"embedding": [0.5, 0.25], "inputTextTokenCount": 7});
        assert_eq!(parse_response(ModelFamily::Titan, &titan, 20), Some((vec![0.5, 0.25], 7)));

        let cohere = json!({"embeddings": [[1.0, 0.0]], "meta": {"billed_units": {"input_tokens": 3}}});
        assert_eq!(parse_response(ModelFamily::Cohere, &cohere, 20), Some((vec![1.0, 0.0], 3)));

        let nova = json!({"embeddings": [{"embedding": [0.0, 1.0]}]});
        assert_eq!(parse_response(ModelFamily::Nova, &nova, 41), Some((vec![0.0, 1.0], 10)));

        assert_eq!(parse_response(ModelFamily::Titan, &json!({"message": "oops"}), 1), None);
    }

    #[test]
    fn auth_failures_are_distinguished() {
        let err = classify_failure("m", StatusCode::BAD_REQUEST, "{\"__type\":\"ExpiredTokenException\"}");
        assert!(matches!(err, Error::EmbeddingAuth { .. }));
        let err = classify_failure("m", StatusCode::FORBIDDEN, "{}");
        assert!(matches!(err, Error::EmbeddingAuth { .. }));
        let err = classify_failure("m", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, Error::Embedding { .. }));
    }

    #[test]
    fn endpoint_override_and_key_from_settings() {
        let settings = EmbeddingSettings {
            api_key: Some("secret".into()),
            endpoint: Some("http://localhost:9999/".into()),
            ..EmbeddingSettings::default()
        };
        let model = get_model_config("titan-v2").unwrap();
        let e = BedrockEmbedder::new(model, 1024, &settings).unwrap();
        assert_eq!(e.url(), "http://localhost:9999/model/amazon.titan-embed-text-v2:0/invoke");
        assert!(e.embed_document("   ").is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
