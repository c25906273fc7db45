// Modular translation architecture
//
// Dialogue is translated in small batches by an external LLM service:
// - Ollama: local /api/generate endpoint in JSON mode
// - Gemini: Google generateContent API
// The batcher owns retries, cooldowns and merging results back onto segments.

pub mod batcher;
pub mod common;
pub mod gemini;
pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use batcher::*;
pub use common::*;
use crate::config::{TranslateConfig, TranslationProvider};
use crate::error::Result;
use crate::segment::SegmentId;

/// One dialogue line as sent to the translator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationItem {
    pub id: SegmentId,
    pub source_text: String,
    pub speaker: u32,
    /// Human-readable slot, e.g. "2.5s - 5.0s"
    pub timestamp: String,
    pub duration_sec: f64,
    pub max_words_allowed: u32,
}

/// One translated line as returned by the translator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedItem {
    pub id: SegmentId,
    pub text: String,
    #[serde(default)]
    pub emotion: Option<String>,
}

/// Main trait for translation backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate one batch. An empty or unparseable answer is an error so the caller can retry.
    async fn translate_batch(
        &self,
        items: &[TranslationItem],
        target_language: &str,
    ) -> Result<Vec<TranslatedItem>>;

    /// Check that the backend is reachable and the model exists
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Create a translator for the configured provider. Fails if a required credential is missing.
    pub fn create_translator(config: TranslateConfig) -> Result<Box<dyn Translator>> {
        match config.provider {
            TranslationProvider::Ollama => Ok(Box::new(ollama::OllamaTranslator::new(config)?)),
            TranslationProvider::Gemini => Ok(Box::new(gemini::GeminiTranslator::new(config)?)),
        }
    }
}
