//! Dialogue data model shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{Result, RedubError};

/// Stable identity of a segment, assigned at creation in output order.
pub type SegmentId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Surprised,
}

impl Emotion {
    /// Lenient parse for tags coming back from a translator; unknown tags become neutral.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "fearful" => Self::Fearful,
            "surprised" => Self::Surprised,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Fearful => "fearful",
            Self::Surprised => "surprised",
        }
    }
}

/// Where a segment's transcript currently comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationState {
    /// Never sent for translation (or blank)
    #[default]
    Source,
    /// Transcript replaced by the translator's text
    Translated,
    /// The batch exhausted its retries; transcript is still source text
    Failed,
    /// The translator answered but omitted this segment; transcript is still source text
    Missing,
}

/// A continuous span of speech by one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub start: f64,
    pub end: f64,
    pub speaker: u32,
    pub transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(default)]
    pub translation: TranslationState,
}

impl Segment {
    /// Create a segment, rejecting non-finite or inverted spans.
    pub fn new(id: SegmentId, start: f64, end: f64, speaker: u32, transcript: impl Into<String>) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(RedubError::InvalidInput(format!(
                "segment {} has non-finite bounds ({}, {})",
                id, start, end
            )));
        }
        if end < start {
            return Err(RedubError::InvalidInput(format!(
                "segment {} ends before it starts ({:.3}s < {:.3}s)",
                id, end, start
            )));
        }

        Ok(Self {
            id,
            start,
            end,
            speaker,
            transcript: transcript.into(),
            emotion: None,
            translation: TranslationState::Source,
        })
    }

    /// Length of the original slot in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_blank(&self) -> bool {
        self.transcript.trim().is_empty()
    }
}

/// Word-level recognition result, consumed only by the segment builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    pub start_offset: f64,
    pub end_offset: f64,
    pub speaker_tag: u32,
}

impl WordToken {
    pub fn new(text: impl Into<String>, start_offset: f64, end_offset: f64, speaker_tag: u32) -> Self {
        Self {
            text: text.into(),
            start_offset,
            end_offset,
            speaker_tag,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start_offset.is_finite() || !self.end_offset.is_finite() {
            return Err(RedubError::InvalidInput(format!(
                "token '{}' has non-finite offsets",
                self.text
            )));
        }
        if self.end_offset < self.start_offset {
            return Err(RedubError::InvalidInput(format!(
                "token '{}' ends before it starts ({:.3}s < {:.3}s)",
                self.text, self.end_offset, self.start_offset
            )));
        }
        Ok(())
    }

    /// Shift the token from chunk-local to global time.
    pub fn shifted(mut self, offset: f64) -> Self {
        self.start_offset += offset;
        self.end_offset += offset;
        self
    }
}

/// A synthesized clip ready to be placed on the dialogue track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsClip {
    pub segment_id: SegmentId,
    pub path: PathBuf,
    /// Copied from the segment; where the clip is placed on the timeline
    pub start: f64,
    /// Measured duration of the final clip file
    pub duration: f64,
    /// Tempo factor that was applied; 1.0 when uncorrected
    pub speed_factor: f64,
}

/// Renumber segments 0..n in their current order.
pub fn assign_ids(segments: &mut [Segment]) {
    for (idx, segment) in segments.iter_mut().enumerate() {
        segment.id = idx as SegmentId;
    }
}

/// Check that ids are strictly increasing, which makes them usable as a join key.
pub fn validate_ids(segments: &[Segment]) -> Result<()> {
    for pair in segments.windows(2) {
        if pair[1].id <= pair[0].id {
            return Err(RedubError::InvalidInput(format!(
                "segment ids must be strictly increasing, found {} after {}",
                pair[1].id, pair[0].id
            )));
        }
    }
    Ok(())
}

/// Load a segment list previously written by `save_segments`.
pub async fn load_segments<P: AsRef<Path>>(path: P) -> Result<Vec<Segment>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RedubError::FileNotFound(path.display().to_string()));
    }

    let content = fs::read_to_string(path).await?;
    let mut segments: Vec<Segment> = serde_json::from_str(&content)?;

    let before = segments.len();
    segments.retain(|s| {
        let valid = s.start.is_finite() && s.end.is_finite() && s.end >= s.start;
        if !valid {
            warn!("Dropping segment {} with invalid span ({}, {})", s.id, s.start, s.end);
        }
        valid
    });
    if segments.len() != before {
        warn!("Dropped {} invalid segment(s) from {}", before - segments.len(), path.display());
    }

    validate_ids(&segments)?;
    info!("Loaded {} segments from {}", segments.len(), path.display());
    Ok(segments)
}

pub async fn save_segments<P: AsRef<Path>>(segments: &[Segment], path: P) -> Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(segments)?;
    fs::write(path, content).await?;
    info!("Saved {} segments to {}", segments.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_rejects_inverted_span() {
        assert!(Segment::new(0, 2.0, 1.0, 0, "x").is_err());
        assert!(Segment::new(0, f64::NAN, 1.0, 0, "x").is_err());
        assert!(Segment::new(0, 1.0, 2.0, 0, "x").is_ok());
    }

    #[test]
    fn test_emotion_tags() {
        assert_eq!(Emotion::from_tag(" Angry "), Emotion::Angry);
        assert_eq!(Emotion::from_tag("bored"), Emotion::Neutral);
        assert_eq!(Emotion::Surprised.as_str(), "surprised");
    }

    #[test]
    fn test_token_shift_and_validate() {
        let token = WordToken::new("hi", 0.5, 0.9, 1).shifted(60.0);
        assert_eq!(token.start_offset, 60.5);
        assert_eq!(token.end_offset, 60.9);
        assert!(token.validate().is_ok());
        assert!(WordToken::new("bad", 1.0, 0.5, 0).validate().is_err());
    }

    #[test]
    fn test_segment_json_shape() {
        let mut segment = Segment::new(3, 1.0, 2.5, 1, "hola").unwrap();
        segment.emotion = Some(Emotion::Happy);
        segment.translation = TranslationState::Translated;

        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json["emotion"], "happy");
        assert_eq!(json["translation"], "translated");

        // Older files without the optional fields still load
        let parsed: Segment = serde_json::from_str(
            r#"{"id":0,"start":0.0,"end":1.0,"speaker":0,"transcript":"hi"}"#,
        )
        .unwrap();
        assert_eq!(parsed.emotion, None);
        assert_eq!(parsed.translation, TranslationState::Source);
    }

    #[test]
    fn test_validate_ids() {
        let mut segments = vec![
            Segment::new(5, 0.0, 1.0, 0, "a").unwrap(),
            Segment::new(5, 1.0, 2.0, 0, "b").unwrap(),
        ];
        assert!(validate_ids(&segments).is_err());
        assign_ids(&mut segments);
        assert!(validate_ids(&segments).is_ok());
        assert_eq!(segments[1].id, 1);
    }

    #[tokio::test]
    async fn test_save_load_drops_invalid_spans() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.json");
        std::fs::write(
            &path,
            r#"[{"id":0,"start":0.0,"end":1.0,"speaker":0,"transcript":"ok"},
               {"id":1,"start":3.0,"end":2.0,"speaker":0,"transcript":"inverted"}]"#,
        )
        .unwrap();

        let loaded = tokio_test::assert_ok!(load_segments(&path).await);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].transcript, "ok");

        save_segments(&loaded, &path).await.unwrap();
        let again = load_segments(&path).await.unwrap();
        assert_eq!(again, loaded);
    }
}
