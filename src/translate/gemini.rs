use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::{resolve_credential, TranslateConfig};
use crate::error::{Result, RedubError};
use super::common::{build_batch_prompt, build_http_client, parse_translation_response};
use super::{TranslatedItem, TranslationItem, Translator};

const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

/// Translator backed by the Gemini generateContent API
pub struct GeminiTranslator {
    client: Client,
    config: TranslateConfig,
    api_key: String,
}

impl GeminiTranslator {
    pub fn new(config: TranslateConfig) -> Result<Self> {
        let api_key = resolve_credential(config.api_key.as_deref(), API_KEY_ENV)?;
        let client = build_http_client(config.timeout_secs)?;
        Ok(Self { client, config, api_key })
    }
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate_batch(
        &self,
        items: &[TranslationItem],
        target_language: &str,
    ) -> Result<Vec<TranslatedItem>> {
        let prompt = build_batch_prompt(items, self.config.source_language.as_deref(), target_language)?;
        let url = format!("{}/v1beta/models/{}:generateContent", self.config.endpoint(), self.config.model());
        debug!("Sending translation batch of {} to: {}", items.len(), url);

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": { "responseMimeType": "application/json" }
            }))
            .send()
            .await
            .map_err(|e| RedubError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RedubError::Translation(format!(
                "Gemini API error {}: {}", status, error_text
            )));
        }

        let body: GenerateContentResponse = response.json().await
            .map_err(|e| RedubError::Translation(format!("Failed to parse response: {}", e)))?;

        let text = body.text();
        debug!("Raw Gemini response: {}", text);
        parse_translation_response(&text)
    }

    async fn check_availability(&self) -> Result<()> {
        let url = format!("{}/v1beta/models/{}", self.config.endpoint(), self.config.model());

        let response = self.client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| RedubError::Translation(format!("Failed to connect to Gemini: {}", e)))?;

        if response.status().is_success() {
            info!("Gemini model '{}' is available", self.config.model());
            Ok(())
        } else {
            Err(RedubError::Translation(format!(
                "Gemini model '{}' is not available: HTTP {}",
                self.config.model(),
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_text_is_concatenated() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"[{\"id\":0,"},{"text":"\"text\":\"hi\"}]"}]}}]}"#,
        )
        .unwrap();
        let items = parse_translation_response(&body.text()).unwrap();
        assert_eq!(items[0].text, "hi");
    }

    #[test]
    fn test_blocked_response_has_no_text() {
        let body: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(body.text(), "");
        assert!(parse_translation_response(&body.text()).is_err());
    }

    #[test]
    fn test_configured_key_is_used() {
        let config = TranslateConfig {
            provider: crate::config::TranslationProvider::Gemini,
            api_key: Some("test-key".to_string()),
            ..TranslateConfig::default()
        };
        let translator = GeminiTranslator::new(config).unwrap();
        assert_eq!(translator.api_key, "test-key");
        assert_eq!(translator.config.model(), "gemini-2.5-flash");
    }
}
