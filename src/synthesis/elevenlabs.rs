use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{resolve_credential, SynthesisConfig};
use crate::error::{Result, RedubError};
use super::{SpeechSynthesizer, SynthesisRequest, VoiceTable};

const API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// ElevenLabs text-to-speech client
pub struct ElevenLabsSynthesizer {
    client: Client,
    config: SynthesisConfig,
    api_key: String,
    voices: VoiceTable,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: SynthesisConfig) -> Result<Self> {
        let api_key = resolve_credential(config.api_key.as_deref(), API_KEY_ENV)?;
        let voices = VoiceTable::from_config(&config)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(RedubError::Http)?;

        Ok(Self { client, config, api_key, voices })
    }

    fn url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.config.endpoint.trim_end_matches('/'),
            voice_id
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest, output_path: &Path) -> Result<()> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(RedubError::Synthesis("refusing to synthesize empty text".to_string()));
        }

        let voice = self.voices.select(request.speaker, &request.language);
        let preview: String = text.chars().take(40).collect();
        info!("│ Speaker {} ({}) | {}...", request.speaker, voice.voice_id, preview);

        let response = self.client
            .post(self.url(&voice.voice_id))
            .query(&[("output_format", self.config.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .json(&TextToSpeechRequest {
                text,
                model_id: &voice.model_id,
            })
            .send()
            .await
            .map_err(|e| RedubError::Synthesis(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RedubError::Synthesis(format!(
                "ElevenLabs API error {}: {}", status, error_text
            )));
        }

        let audio = response.bytes().await
            .map_err(|e| RedubError::Synthesis(format!("Failed to read audio: {}", e)))?;
        if audio.is_empty() {
            return Err(RedubError::Synthesis("ElevenLabs returned no audio".to_string()));
        }

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, &audio).await?;

        debug!("Wrote {} bytes to {}", audio.len(), output_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_and_request_body() {
        let config = SynthesisConfig {
            endpoint: "https://tts.example.com/".to_string(),
            api_key: Some("key".to_string()),
            ..SynthesisConfig::default()
        };
        let synthesizer = ElevenLabsSynthesizer::new(config).unwrap();
        assert_eq!(
            synthesizer.url("voice-1"),
            "https://tts.example.com/v1/text-to-speech/voice-1"
        );

        let body = serde_json::to_value(TextToSpeechRequest {
            text: "नमस्ते",
            model_id: "eleven_multilingual_v2",
        })
        .unwrap();
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_request() {
        let config = SynthesisConfig {
            api_key: Some("key".to_string()),
            ..SynthesisConfig::default()
        };
        let synthesizer = ElevenLabsSynthesizer::new(config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let request = SynthesisRequest {
            text: "   ".to_string(),
            speaker: 0,
            language: "hi".to_string(),
        };

        let result = synthesizer.synthesize(&request, &dir.path().join("x.mp3")).await;
        assert!(matches!(result, Err(RedubError::Synthesis(_))));
    }
}
