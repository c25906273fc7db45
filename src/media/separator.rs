use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::SeparationConfig;
use crate::error::{Result, RedubError};
use super::MediaCommand;

/// Output of a two-stem separation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatedStems {
    pub vocals: PathBuf,
    pub background: PathBuf,
}

/// Splits a mixed track into dialogue and everything else
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VocalSeparator: Send + Sync {
    async fn separate(&self, audio_path: &Path, output_dir: &Path) -> Result<SeparatedStems>;
}

/// Runs the Demucs CLI in two-stem mode
pub struct DemucsSeparator {
    config: SeparationConfig,
}

impl DemucsSeparator {
    pub fn new(config: SeparationConfig) -> Self {
        Self { config }
    }

    /// Where demucs writes the stems: <out>/<model>/<input stem>/{vocals,no_vocals}.<ext>
    pub fn stem_paths(&self, audio_path: &Path, output_dir: &Path) -> SeparatedStems {
        let track = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let ext = if self.config.mp3 { "mp3" } else { "wav" };
        let dir = output_dir.join(&self.config.model).join(track);

        SeparatedStems {
            vocals: dir.join(format!("vocals.{}", ext)),
            background: dir.join(format!("no_vocals.{}", ext)),
        }
    }

    fn command(&self, audio_path: &Path, output_dir: &Path) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.config.binary_path, "Vocal separation")
            .args(["--two-stems", "vocals"])
            .arg("-n")
            .arg(&self.config.model);
        if self.config.mp3 {
            cmd = cmd.arg("--mp3");
        }
        cmd.arg("-o")
            .arg(output_dir.to_string_lossy().to_string())
            .arg(audio_path.to_string_lossy().to_string())
    }
}

#[async_trait]
impl VocalSeparator for DemucsSeparator {
    async fn separate(&self, audio_path: &Path, output_dir: &Path) -> Result<SeparatedStems> {
        if !audio_path.exists() {
            return Err(RedubError::FileNotFound(audio_path.display().to_string()));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        info!("Separating vocals from background ({}), this may take several minutes", self.config.model);
        self.command(audio_path, output_dir)
            .execute()
            .await
            .map_err(|e| RedubError::Separation(e.to_string()))?;

        let stems = self.stem_paths(audio_path, output_dir);
        if stems.vocals.exists() && stems.background.exists() {
            info!("Vocals extracted: {}", stems.vocals.display());
            info!("Background extracted: {}", stems.background.display());
            return Ok(stems);
        }

        if let Some(parent) = stems.vocals.parent() {
            let found: Vec<String> = std::fs::read_dir(parent)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default();
            warn!("Found files in {}: {:?}", parent.display(), found);
        }

        Err(RedubError::Separation(format!(
            "expected {} and {}",
            stems.vocals.display(),
            stems.background.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_paths() {
        let separator = DemucsSeparator::new(SeparationConfig::default());
        let stems = separator.stem_paths(Path::new("work/movie_original.wav"), Path::new("work/separated"));
        assert_eq!(stems.vocals, PathBuf::from("work/separated/htdemucs/movie_original/vocals.mp3"));
        assert_eq!(stems.background, PathBuf::from("work/separated/htdemucs/movie_original/no_vocals.mp3"));
    }

    #[test]
    fn test_command_arguments() {
        let separator = DemucsSeparator::new(SeparationConfig {
            mp3: false,
            ..SeparationConfig::default()
        });
        let cmd = separator.command(Path::new("a.wav"), Path::new("out"));
        assert_eq!(cmd.args, vec!["--two-stems", "vocals", "-n", "htdemucs", "-o", "out", "a.wav"]);
        assert!(separator.stem_paths(Path::new("a.wav"), Path::new("out")).vocals.ends_with("vocals.wav"));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let separator = DemucsSeparator::new(SeparationConfig::default());
        let result = separator.separate(&dir.path().join("none.wav"), dir.path()).await;
        assert!(matches!(result, Err(RedubError::FileNotFound(_))));
    }
}
