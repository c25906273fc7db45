use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use crate::config::{MediaConfig, MixConfig};
use crate::error::{Result, RedubError};
use crate::mix::MixSpec;
use super::{MediaCommandBuilder, MediaProcessorTrait};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    mix: MixConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    pub fn new(config: MediaConfig, mix: MixConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path, &config.probe_path);

        Self {
            config,
            mix,
            command_builder,
        }
    }
}

/// Parse ffprobe's bare duration output
pub fn parse_probe_duration(stdout: &str) -> Result<f64> {
    let text = stdout.trim();
    let duration: f64 = text
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .parse()
        .map_err(|_| RedubError::Media(format!("Unexpected ffprobe duration output: '{}'", text)))?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(RedubError::Media(format!("Invalid duration: {}", duration)));
    }
    Ok(duration)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());
        if !video_path.exists() {
            return Err(RedubError::FileNotFound(video_path.display().to_string()));
        }

        ensure_parent(audio_path).await?;
        self.command_builder.extract_audio(video_path, audio_path).execute().await?;

        info!("Audio extraction completed");
        Ok(())
    }

    async fn probe_duration(&self, media_path: &Path) -> Result<f64> {
        let stdout = self.command_builder.probe_duration(media_path).execute_output().await?;
        let duration = parse_probe_duration(&stdout)?;
        debug!("{} lasts {:.3}s", media_path.display(), duration);
        Ok(duration)
    }

    async fn change_tempo(&self, input_path: &Path, output_path: &Path, factor: f64) -> Result<()> {
        debug!("Changing tempo of {} by x{:.3}", input_path.display(), factor);
        self.command_builder
            .change_tempo(input_path, output_path, factor)
            .execute()
            .await
    }

    async fn render_mix(&self, spec: &MixSpec, output_path: &Path) -> Result<()> {
        info!("Mixing {} clips over {} -> {}", spec.clips.len(), spec.background.display(), output_path.display());
        ensure_parent(output_path).await?;

        let command = self.command_builder.render_mix(spec, &self.mix, output_path);
        debug!("Filter graph: {}", spec.to_filter_graph());
        command.execute().await?;

        info!("Dubbed audio saved: {}", output_path.display());
        Ok(())
    }

    async fn mux_audio(&self, video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()> {
        info!("Muxing {} with {} -> {}", video_path.display(), audio_path.display(), output_path.display());
        ensure_parent(output_path).await?;

        self.command_builder
            .mux_audio(video_path, audio_path, output_path)
            .execute()
            .await?;

        info!("Video muxing completed");
        Ok(())
    }

    fn check_availability(&self) -> Result<()> {
        for binary in [&self.config.binary_path, &self.config.probe_path] {
            let output = Command::new(binary)
                .arg("-version")
                .output()
                .map_err(|e| RedubError::Media(format!("{} not found: {}", binary, e)))?;

            if !output.status.success() {
                return Err(RedubError::Media(format!("{} version check failed", binary)));
            }
        }

        info!("Media processor is available");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_duration() {
        assert_eq!(parse_probe_duration("3.000000\n").unwrap(), 3.0);
        assert_eq!(parse_probe_duration(" 2.05 ").unwrap(), 2.05);
        assert!(parse_probe_duration("N/A").is_err());
        assert!(parse_probe_duration("").is_err());
        assert!(parse_probe_duration("-1.0").is_err());
    }

    #[tokio::test]
    async fn test_extract_from_missing_video() {
        let processor = MediaProcessorImpl::new(MediaConfig::default(), MixConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let result = processor
            .extract_audio(&dir.path().join("missing.mp4"), &dir.path().join("audio.wav"))
            .await;
        assert!(matches!(result, Err(RedubError::FileNotFound(_))));
    }

    #[test]
    fn test_missing_binaries_reported() {
        let processor = MediaProcessorImpl::new(
            MediaConfig {
                binary_path: "redub-no-such-ffmpeg".to_string(),
                probe_path: "redub-no-such-ffprobe".to_string(),
            },
            MixConfig::default(),
        );
        assert!(matches!(processor.check_availability(), Err(RedubError::Media(_))));
    }
}
