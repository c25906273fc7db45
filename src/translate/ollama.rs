use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::TranslateConfig;
use crate::error::{Result, RedubError};
use super::common::{build_batch_prompt, build_http_client, parse_translation_response};
use super::{TranslatedItem, TranslationItem, Translator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

/// Translator backed by a local Ollama server
pub struct OllamaTranslator {
    client: Client,
    config: TranslateConfig,
}

impl OllamaTranslator {
    pub fn new(config: TranslateConfig) -> Result<Self> {
        let client = build_http_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate_batch(
        &self,
        items: &[TranslationItem],
        target_language: &str,
    ) -> Result<Vec<TranslatedItem>> {
        let prompt = build_batch_prompt(items, self.config.source_language.as_deref(), target_language)?;

        let request = GenerateRequest {
            model: self.config.model().to_string(),
            prompt,
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.config.endpoint());
        debug!("Sending translation batch of {} to: {}", items.len(), url);

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RedubError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RedubError::Translation(format!(
                "Ollama API error {}: {}", status, error_text
            )));
        }

        let generated: GenerateResponse = response.json().await
            .map_err(|e| RedubError::Translation(format!("Failed to parse response: {}", e)))?;

        debug!("Raw Ollama response: {}", generated.response);
        parse_translation_response(&generated.response)
    }

    /// Check if Ollama is available and the model is loaded
    async fn check_availability(&self) -> Result<()> {
        let url = format!("{}/api/show", self.config.endpoint());

        let response = self.client
            .post(&url)
            .json(&json!({ "name": self.config.model() }))
            .send()
            .await
            .map_err(|e| RedubError::Translation(format!("Failed to connect to Ollama: {}", e)))?;

        if response.status().is_success() {
            info!("Ollama model '{}' is available", self.config.model());
            Ok(())
        } else {
            Err(RedubError::Translation(format!(
                "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
                self.config.model(), self.config.model()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_asks_for_json() {
        let request = GenerateRequest {
            model: "llama3.2:3b".to_string(),
            prompt: "translate".to_string(),
            stream: false,
            format: "json".to_string(),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["model"], "llama3.2:3b");
    }

    #[test]
    fn test_generate_response_ignores_extra_fields() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"model":"llama3.2:3b","created_at":"2024-01-01T00:00:00Z","response":"[{\"id\":3,\"text\":\"नमस्ते\",\"emotion\":\"happy\"}]","done":true,"total_duration":123}"#,
        )
        .unwrap();
        assert!(body.done);

        let items = parse_translation_response(&body.response).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 3);
        assert_eq!(items[0].text, "नमस्ते");
    }

    #[test]
    fn test_defaults_point_at_local_server() {
        let translator = OllamaTranslator::new(TranslateConfig::default()).unwrap();
        assert_eq!(translator.config.endpoint(), "http://localhost:11434");
        assert_eq!(translator.config.model(), "llama3.2:3b");
    }
}
