use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{resolve_credential, RecognitionConfig, RecognitionMode};
use crate::error::{Result, RedubError};
use crate::segment::{Segment, SegmentId, WordToken};
use super::{RecognitionOutput, Recognizer};

const API_KEY_ENV: &str = "DEEPGRAM_API_KEY";

/// Deepgram pre-recorded response, reduced to the fields we read
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepgramResponse {
    #[serde(default)]
    pub results: Option<DeepgramResults>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepgramResults {
    #[serde(default)]
    pub channels: Vec<DeepgramChannel>,
    #[serde(default)]
    pub utterances: Option<Vec<DeepgramUtterance>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepgramChannel {
    #[serde(default)]
    pub alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepgramAlternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub words: Vec<DeepgramWord>,
    #[serde(default)]
    pub paragraphs: Option<DeepgramParagraphs>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepgramParagraphs {
    #[serde(default)]
    pub paragraphs: Vec<DeepgramParagraph>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepgramParagraph {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub sentences: Vec<DeepgramSentence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepgramSentence {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepgramUtterance {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub speaker: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepgramWord {
    pub word: String,
    #[serde(default)]
    pub punctuated_word: Option<String>,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub speaker: Option<u32>,
}

impl DeepgramResponse {
    fn first_alternative(&self) -> Option<&DeepgramAlternative> {
        self.results
            .as_ref()?
            .channels
            .first()?
            .alternatives
            .first()
    }
}

/// Mapper from Deepgram's format to segments and word tokens
pub struct DeepgramMapper;

impl DeepgramMapper {
    /// Segments from utterances, falling back to paragraphs (speaker 0) and
    /// finally to the whole transcript as a single zero-length segment.
    pub fn to_segments(response: &DeepgramResponse) -> Vec<Segment> {
        if let Some(utterances) = response
            .results
            .as_ref()
            .and_then(|r| r.utterances.as_ref())
            .filter(|u| !u.is_empty())
        {
            let segments = collect_segments(utterances.iter().map(|u| {
                (u.start, u.end, u.speaker.unwrap_or(0), u.transcript.trim().to_string())
            }));
            let speakers: std::collections::BTreeSet<u32> = segments.iter().map(|s| s.speaker).collect();
            info!("Found {} utterances with {} speaker(s)", segments.len(), speakers.len());
            return segments;
        }

        let Some(alternative) = response.first_alternative() else {
            warn!("Recognition response has no channels");
            return Vec::new();
        };

        if let Some(paragraphs) = alternative.paragraphs.as_ref().filter(|p| !p.paragraphs.is_empty()) {
            warn!("No utterances in response, falling back to paragraphs without speakers");
            return collect_segments(paragraphs.paragraphs.iter().map(|p| {
                let text = p.sentences.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
                (p.start, p.end, 0, text.trim().to_string())
            }));
        }

        let transcript = alternative.transcript.trim();
        if transcript.is_empty() {
            return Vec::new();
        }

        warn!("No utterances or paragraphs in response, using the whole transcript");
        collect_segments(std::iter::once((0.0, 0.0, 0, transcript.to_string())))
    }

    /// Word tokens of the first alternative, shifted by `offset` seconds.
    pub fn to_words(response: &DeepgramResponse, offset: f64) -> Vec<WordToken> {
        response
            .first_alternative()
            .map(|alt| {
                alt.words
                    .iter()
                    .map(|w| {
                        let text = w.punctuated_word.as_deref().unwrap_or(w.word.as_str());
                        WordToken::new(text, w.start, w.end, w.speaker.unwrap_or(0)).shifted(offset)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_output(response: &DeepgramResponse, mode: RecognitionMode) -> RecognitionOutput {
        match mode {
            RecognitionMode::Utterances => RecognitionOutput::Utterances(Self::to_segments(response)),
            RecognitionMode::Words => RecognitionOutput::Words(Self::to_words(response, 0.0)),
        }
    }
}

fn collect_segments(spans: impl Iterator<Item = (f64, f64, u32, String)>) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (start, end, speaker, text) in spans {
        match Segment::new(segments.len() as SegmentId, start, end, speaker, text) {
            Ok(segment) => segments.push(segment),
            Err(e) => warn!("Skipping recognized span: {}", e),
        }
    }
    segments
}

/// Load a previously saved Deepgram JSON response
pub async fn load_deepgram_json<P: AsRef<Path>>(path: P, mode: RecognitionMode) -> Result<RecognitionOutput> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RedubError::FileNotFound(path.display().to_string()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let response: DeepgramResponse = serde_json::from_str(&content)
        .map_err(|e| RedubError::Recognition(format!("Invalid Deepgram JSON in {}: {}", path.display(), e)))?;

    Ok(DeepgramMapper::to_output(&response, mode))
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("m4a") | Some("aac") => "audio/mp4",
        Some("ogg") | Some("opus") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Deepgram pre-recorded transcription client
pub struct DeepgramRecognizer {
    client: Client,
    config: RecognitionConfig,
    api_key: String,
    language: Option<String>,
}

impl DeepgramRecognizer {
    pub fn new(config: RecognitionConfig, language: Option<String>) -> Result<Self> {
        let api_key = resolve_credential(config.api_key.as_deref(), API_KEY_ENV)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RedubError::Http)?;

        Ok(Self { client, config, api_key, language })
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("model", self.config.model.clone()),
            ("smart_format", "true".to_string()),
            ("punctuate", "true".to_string()),
            ("utterances", (self.config.mode == RecognitionMode::Utterances).to_string()),
            ("diarize", self.config.diarize.to_string()),
        ];
        if let Some(language) = &self.language {
            query.push(("language", language.clone()));
        }
        query
    }

    /// Send the audio and return the parsed response body
    pub async fn transcribe_raw(&self, audio_path: &Path) -> Result<DeepgramResponse> {
        if !audio_path.exists() {
            return Err(RedubError::FileNotFound(audio_path.display().to_string()));
        }

        let audio = tokio::fs::read(audio_path).await?;
        let url = format!("{}/v1/listen", self.config.endpoint.trim_end_matches('/'));
        info!(
            "Transcribing {} ({} bytes, diarization {})",
            audio_path.display(),
            audio.len(),
            if self.config.diarize { "enabled" } else { "disabled" }
        );

        let response = self.client
            .post(&url)
            .query(&self.query())
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", content_type_for(audio_path))
            .body(audio)
            .send()
            .await
            .map_err(|e| RedubError::Recognition(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RedubError::Recognition(format!(
                "Deepgram API error {}: {}", status, error_text
            )));
        }

        let body: DeepgramResponse = response.json().await
            .map_err(|e| RedubError::Recognition(format!("Failed to parse response: {}", e)))?;
        debug!("Deepgram returned {} channel(s)", body.results.as_ref().map(|r| r.channels.len()).unwrap_or(0));
        Ok(body)
    }
}

#[async_trait]
impl Recognizer for DeepgramRecognizer {
    async fn recognize(&self, audio_path: &Path) -> Result<RecognitionOutput> {
        let response = self.transcribe_raw(audio_path).await?;
        Ok(DeepgramMapper::to_output(&response, self.config.mode))
    }
}
