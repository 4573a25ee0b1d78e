//! Gemini generation backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::LlmError;

use super::GenerationBackend;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for the Gemini `generateContent` API.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Creates a client for the given model.
    ///
    /// Fails with [`LlmError::MissingApiKey`] when the key is empty; the
    /// HTTP client itself is built lazily enough that construction cannot
    /// otherwise fail.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Overrides the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Model identifier this client generates with.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = ApiRequest {
            contents: vec![ApiContent {
                parts: vec![ApiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: ApiGenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.95,
                response_mime_type: "application/json".to_string(),
            },
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "sending generation request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let text = api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| LlmError::ParseError("response contained no candidates".to_string()))?;

        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct ApiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: ApiContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_api_key_is_rejected() {
        let result = GeminiClient::new("", "gemini-1.5-flash");
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn test_request_serialization_shape() {
        let request = ApiRequest {
            contents: vec![ApiContent {
                parts: vec![ApiPart {
                    text: "hello".to_string(),
                }],
            }],
            generation_config: ApiGenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.95,
                response_mime_type: "application/json".to_string(),
            },
        };

        let json = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "{\"quiz\": []}"}]}}
            ]
        }"#;

        let parsed: ApiResponse = serde_json::from_str(body).expect("should parse");
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].content.parts[0].text, "{\"quiz\": []}");
    }

    #[tokio::test]
    async fn test_connection_error_maps_to_request_failed() {
        let client = GeminiClient::new("test-key", "gemini-1.5-flash")
            .expect("constructor should succeed")
            .with_base_url("http://127.0.0.1:1");

        let err = client.generate("prompt").await.expect_err("no server listening");
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }
}
