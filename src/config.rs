use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::error::{Result, RedubError};

// Default values for optional configuration fields
fn default_request_timeout_secs() -> u64 {
    300
}

fn default_output_format() -> String {
    "mp3_44100_128".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub recognition: RecognitionConfig,
    pub segmentation: SegmentationConfig,
    pub translate: TranslateConfig,
    pub synthesis: SynthesisConfig,
    pub mix: MixConfig,
    pub media: MediaConfig,
    pub separation: SeparationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Default dubbing target language code
    pub target_language: String,
    /// Source language hint passed to recognition (None = auto-detect)
    pub source_language: Option<String>,
    /// Directory for intermediate audio (extracted track, stems, clips)
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Deepgram-compatible endpoint base URL
    pub endpoint: String,
    /// Recognition model
    pub model: String,
    /// API key; falls back to DEEPGRAM_API_KEY
    pub api_key: Option<String>,
    /// Request speaker diarization
    pub diarize: bool,
    /// Whether segments come from service utterances or from our own word segmentation
    pub mode: RecognitionMode,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognitionMode {
    /// Utterances: trust the service's utterance boundaries
    Utterances,
    /// Words: request word-level tokens and build segments locally
    Words,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Gap between words (seconds) that always closes a segment
    pub pause_split_secs: f64,
    /// Segment span (seconds) after which a small pause is enough to split
    pub max_span_secs: f64,
    /// Minimum gap (seconds) for a length-triggered split
    pub soft_split_gap_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Translation backend
    pub provider: TranslationProvider,
    /// Backend endpoint base URL (None = provider default)
    pub endpoint: Option<String>,
    /// LLM model to use for translation (None = provider default)
    pub model: Option<String>,
    /// API key (Gemini only); falls back to GEMINI_API_KEY
    pub api_key: Option<String>,
    /// Language of the recognized dialogue, named in the prompt (None = unspecified)
    pub source_language: Option<String>,
    /// Segments per translation request
    pub batch_size: usize,
    /// Attempts per batch before falling back to source text
    pub max_attempts: u32,
    /// Base backoff (seconds), doubled after every failed attempt
    pub backoff_base_secs: f64,
    /// Pause (seconds) after every successful batch
    pub cooldown_secs: f64,
    /// Assumed sustainable speech rate used for word budgets
    pub words_per_second: f64,
    /// Lower bound for any word budget
    pub min_words: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationProvider {
    /// Local Ollama server, /api/generate with JSON format
    Ollama,
    /// Google Gemini generateContent API
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// ElevenLabs-compatible endpoint base URL
    pub endpoint: String,
    /// API key; falls back to ELEVENLABS_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Maximum synthesis requests in flight (the service rejects more than one on low tiers)
    pub max_in_flight: usize,
    /// Pause (seconds) after every successful synthesis call
    pub cooldown_secs: f64,
    /// Clips longer than target * tolerance are sped up
    pub speed_tolerance: f64,
    /// Slots shorter than this (seconds) are never tempo-corrected
    pub min_correctable_secs: f64,
    /// Upper bound on tempo correction
    pub max_speed_factor: f64,
    /// Voice profile used when a language has no entry in `voices`
    pub default_voice: VoiceProfile,
    /// Per-language voice profiles keyed by language code
    pub voices: BTreeMap<String, VoiceProfile>,
    /// Fixed voice assignments for specific diarized speakers
    pub speaker_voices: Vec<SpeakerVoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Synthesis model identifier
    pub model_id: String,
    /// Voice ids, assigned to speakers round-robin
    pub voices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerVoice {
    pub speaker: u32,
    pub voice_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Gain applied to the separated background track
    pub background_gain: f64,
    /// Gain applied to the summed dialogue bus
    pub dialogue_gain: f64,
    /// Common sample rate every input is converted to before mixing
    pub sample_rate: u32,
    /// Common channel layout every input is converted to before mixing
    pub channel_layout: String,
    /// Codec for the rendered dub track
    pub audio_codec: String,
    /// Bitrate for the rendered dub track
    pub audio_bitrate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Path to ffprobe binary
    pub probe_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Path to the demucs executable
    pub binary_path: String,
    /// Separation model; also the name of demucs' output subdirectory
    pub model: String,
    /// Write stems as mp3 instead of wav
    pub mp3: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_language: "hi".to_string(),
            source_language: None,
            work_dir: PathBuf::from(".redub/work"),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepgram.com".to_string(),
            model: "nova-3".to_string(),
            api_key: None,
            diarize: true,
            mode: RecognitionMode::Utterances,
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            pause_split_secs: 0.7,
            max_span_secs: 30.0,
            soft_split_gap_secs: 0.3,
        }
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::Ollama,
            endpoint: None,
            model: None,
            api_key: None,
            source_language: None,
            batch_size: 5,
            max_attempts: 3,
            backoff_base_secs: 5.0,
            cooldown_secs: 2.0,
            words_per_second: 2.5,
            min_words: 3,
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.elevenlabs.io".to_string(),
            api_key: None,
            output_format: default_output_format(),
            max_in_flight: 1,
            cooldown_secs: 0.5,
            speed_tolerance: 1.05,
            min_correctable_secs: 0.5,
            max_speed_factor: 1.3,
            default_voice: VoiceProfile {
                model_id: "eleven_multilingual_v2".to_string(),
                voices: vec![
                    "JBFqnCBsd6RMkjVDRZzb".to_string(), // George
                    "HP3OkBOPWanmqpjL7XVM".to_string(), // Sarah
                ],
            },
            voices: BTreeMap::new(),
            speaker_voices: Vec::new(),
        }
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            background_gain: 0.4,
            dialogue_gain: 2.5,
            sample_rate: 44100,
            channel_layout: "stereo".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            probe_path: "ffprobe".to_string(),
        }
    }
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            binary_path: "demucs".to_string(),
            model: "htdemucs".to_string(),
            mp3: true,
        }
    }
}

impl TranslationProvider {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::Gemini => "https://generativelanguage.googleapis.com",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => "llama3.2:3b",
            Self::Gemini => "gemini-2.5-flash",
        }
    }
}

impl TranslateConfig {
    /// Endpoint base URL without a trailing slash
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
            .trim_end_matches('/')
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RedubError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| RedubError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RedubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| RedubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

/// Resolve an API key from the config value, falling back to an environment variable.
/// Blank values count as unset.
pub fn resolve_credential(configured: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = configured.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(RedubError::MissingCredential(env_var.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_defaults_match_timing_constants() {
        let config = Config::default();
        assert_eq!(config.segmentation.pause_split_secs, 0.7);
        assert_eq!(config.segmentation.max_span_secs, 30.0);
        assert_eq!(config.segmentation.soft_split_gap_secs, 0.3);
        assert_eq!(config.translate.batch_size, 5);
        assert_eq!(config.translate.max_attempts, 3);
        assert_eq!(config.synthesis.max_in_flight, 1);
        assert_eq!(config.synthesis.max_speed_factor, 1.3);
        assert_eq!(config.mix.background_gain, 0.4);
        assert_eq!(config.mix.dialogue_gain, 2.5);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("redub.toml");
        file.write_str(
            r#"
[translate]
provider = "Gemini"
model = "gemini-2.5-pro"

[synthesis.voices.ta]
model_id = "eleven_multilingual_v2"
voices = ["voice-a", "voice-b", "voice-c"]

[[synthesis.speaker_voices]]
speaker = 4
voice_id = "cloned-voice"
"#,
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.translate.provider, TranslationProvider::Gemini);
        assert_eq!(config.translate.model(), "gemini-2.5-pro");
        assert_eq!(config.translate.endpoint(), "https://generativelanguage.googleapis.com");
        assert_eq!(config.translate.batch_size, 5);
        assert_eq!(config.synthesis.voices["ta"].voices.len(), 3);
        assert_eq!(config.synthesis.speaker_voices[0].speaker, 4);
        assert_eq!(config.mix.sample_rate, 44100);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("out.toml");

        let mut config = Config::default();
        config.pipeline.target_language = "ta".to_string();
        config.save_to_file(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.pipeline.target_language, "ta");
        assert_eq!(reloaded.synthesis.default_voice, config.synthesis.default_voice);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("bad.toml");
        file.write_str("[translate\nbatch_size = ").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, RedubError::Config(_)));
    }

    #[test]
    fn test_configured_credential_wins() {
        let key = resolve_credential(Some("  abc  "), "REDUB_TEST_UNUSED_KEY").unwrap();
        assert_eq!(key, "abc");
    }

    #[test]
    fn test_missing_credential() {
        let err = resolve_credential(Some("   "), "REDUB_TEST_SURELY_UNSET_KEY").unwrap_err();
        assert!(matches!(err, RedubError::MissingCredential(name) if name == "REDUB_TEST_SURELY_UNSET_KEY"));
    }
}
