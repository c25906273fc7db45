// Speech synthesis
//
// Synthesizers render one line of dialogue into an audio file. Voice choice is
// resolved through a VoiceTable built from configuration, so no backend keeps
// its own speaker bookkeeping.

pub mod elevenlabs;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub use elevenlabs::*;
use crate::config::{SynthesisConfig, VoiceProfile};
use crate::error::{Result, RedubError};

/// One line to be spoken
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker: u32,
    pub language: String,
}

/// Voice and model chosen for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelection {
    pub voice_id: String,
    pub model_id: String,
}

/// Per-language voice profiles plus fixed per-speaker assignments
#[derive(Debug, Clone)]
pub struct VoiceTable {
    default_profile: VoiceProfile,
    languages: BTreeMap<String, VoiceProfile>,
    speakers: HashMap<u32, String>,
}

impl VoiceTable {
    pub fn from_config(config: &SynthesisConfig) -> Result<Self> {
        if config.default_voice.voices.is_empty() {
            return Err(RedubError::Config("synthesis.default_voice has no voices".to_string()));
        }
        for (language, profile) in &config.voices {
            if profile.voices.is_empty() {
                return Err(RedubError::Config(format!("synthesis.voices.{} has no voices", language)));
            }
        }

        Ok(Self {
            default_profile: config.default_voice.clone(),
            languages: config.voices.clone(),
            speakers: config
                .speaker_voices
                .iter()
                .map(|s| (s.speaker, s.voice_id.clone()))
                .collect(),
        })
    }

    /// Speaker override first, otherwise round-robin over the language's voices.
    pub fn select(&self, speaker: u32, language: &str) -> VoiceSelection {
        let profile = self.languages.get(language).unwrap_or(&self.default_profile);

        let voice_id = match self.speakers.get(&speaker) {
            Some(voice) => voice.clone(),
            None => profile.voices[speaker as usize % profile.voices.len()].clone(),
        };

        VoiceSelection {
            voice_id,
            model_id: profile.model_id.clone(),
        }
    }
}

/// Main trait for speech synthesis backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `request` into `output_path`. The file exists when this returns Ok.
    async fn synthesize(&self, request: &SynthesisRequest, output_path: &Path) -> Result<()>;
}

/// Factory for creating synthesizer instances
pub struct SynthesizerFactory;

impl SynthesizerFactory {
    /// Create the ElevenLabs synthesizer. Fails if no API key can be resolved.
    pub fn create_synthesizer(config: SynthesisConfig) -> Result<Box<dyn SpeechSynthesizer>> {
        Ok(Box::new(ElevenLabsSynthesizer::new(config)?))
    }
}
