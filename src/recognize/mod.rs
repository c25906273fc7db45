// Speech recognition
//
// A recognizer turns an audio file into either service-side utterances or a
// diarized word stream. Word streams go through the SegmentBuilder so both
// paths end in the same Segment list.

pub mod deepgram;

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

pub use deepgram::*;
use crate::config::RecognitionConfig;
use crate::error::Result;
use crate::segment::{assign_ids, Segment, WordToken};
use crate::segmenter::SegmentBuilder;

/// What a recognition pass produced
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutput {
    /// Segments already cut by the service
    Utterances(Vec<Segment>),
    /// Word tokens still to be segmented
    Words(Vec<WordToken>),
}

impl RecognitionOutput {
    /// Resolve into an ordered segment list with fresh ids.
    pub fn into_segments(self, builder: &SegmentBuilder) -> Vec<Segment> {
        match self {
            Self::Utterances(mut segments) => {
                assign_ids(&mut segments);
                segments
            }
            Self::Words(tokens) => builder.build(tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Utterances(segments) => segments.is_empty(),
            Self::Words(tokens) => tokens.is_empty(),
        }
    }
}

/// Main trait for recognition backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize speech in an audio file
    async fn recognize(&self, audio_path: &Path) -> Result<RecognitionOutput>;
}

/// Factory for creating recognizer instances
pub struct RecognizerFactory;

impl RecognizerFactory {
    /// Create the Deepgram recognizer. Fails if no API key can be resolved.
    pub fn create_recognizer(config: RecognitionConfig, language: Option<String>) -> Result<Box<dyn Recognizer>> {
        info!("Using Deepgram recognizer (model {}, {:?} mode)", config.model, config.mode);
        Ok(Box::new(DeepgramRecognizer::new(config, language)?))
    }
}
