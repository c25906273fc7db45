// Media tooling
//
// Every external audio/video process goes through here:
// - Processor: ffmpeg/ffprobe operations behind MediaProcessorTrait
// - Commands: command builders with exit-status and output-file checks
// - Separator: vocal/background stem separation (Demucs)

pub mod commands;
pub mod processor;
pub mod separator;

use async_trait::async_trait;
use std::path::Path;

pub use commands::*;
pub use processor::*;
pub use separator::*;

use crate::config::{MediaConfig, MixConfig};
use crate::error::Result;
use crate::mix::MixSpec;

/// Main trait for media processing operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Extract the audio track from a video
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;

    /// Measured duration of a media file in seconds
    async fn probe_duration(&self, media_path: &Path) -> Result<f64>;

    /// Write a copy of `input_path` played `factor` times faster
    async fn change_tempo(&self, input_path: &Path, output_path: &Path, factor: f64) -> Result<()>;

    /// Render a dialogue mix into an encoded audio file
    async fn render_mix(&self, spec: &MixSpec, output_path: &Path) -> Result<()>;

    /// Replace a video's audio track
    async fn mux_audio(&self, video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()>;

    /// Check if media processor is available
    fn check_availability(&self) -> Result<()>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig, mix: MixConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(config, mix))
    }
}
