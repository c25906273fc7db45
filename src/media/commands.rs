use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::config::MixConfig;
use crate::error::{Result, RedubError};
use crate::mix::MixSpec;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    /// File that must exist and be non-empty after a successful run
    pub expected_output: Option<PathBuf>,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            expected_output: None,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file and require it to exist after the run
    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.expected_output = Some(path.as_ref().to_path_buf());
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Quiet ffmpeg banner and progress, keep errors
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-loglevel").arg("error")
    }

    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-filter:a").arg(filter)
    }

    pub fn filter_complex<S: Into<String>>(self, graph: S) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    /// Select a stream or filter output label for the next output
    pub fn map<S: Into<String>>(self, specifier: S) -> Self {
        self.arg("-map").arg(specifier)
    }

    /// Execute the command, returning captured stdout
    pub async fn execute_output(&self) -> Result<String> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| RedubError::Media(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RedubError::Media(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        if let Some(path) = &self.expected_output {
            let produced = tokio::fs::metadata(path)
                .await
                .map(|m| m.len() > 0)
                .unwrap_or(false);
            if !produced {
                return Err(RedubError::Media(format!(
                    "{} produced no output at {}",
                    self.description,
                    path.display()
                )));
            }
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Execute the command
    pub async fn execute(&self) -> Result<()> {
        self.execute_output().await.map(|_| ())
    }
}

/// Builder for the ffmpeg/ffprobe invocations used while dubbing
pub struct MediaCommandBuilder {
    binary_path: String,
    probe_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, probe_path: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            probe_path: probe_path.into(),
        }
    }

    /// Decode the source's audio track into a standalone file
    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .quiet()
            .overwrite()
            .input(video_path)
            .no_video()
            .output(audio_path)
    }

    /// Container duration in seconds, printed as a bare number
    pub fn probe_duration<P: AsRef<Path>>(&self, media_path: P) -> MediaCommand {
        MediaCommand::new(&self.probe_path, "Duration probe")
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(media_path.as_ref().to_string_lossy().to_string())
    }

    /// Speed up a clip without changing pitch
    pub fn change_tempo<P: AsRef<Path>>(&self, input_path: P, output_path: P, factor: f64) -> MediaCommand {
        MediaCommand::new(&self.binary_path, format!("Tempo change x{:.3}", factor))
            .quiet()
            .overwrite()
            .input(input_path)
            .audio_filter(format!("atempo={}", factor))
            .no_video()
            .output(output_path)
    }

    /// Render a dialogue mix over the background
    pub fn render_mix<P: AsRef<Path>>(&self, spec: &MixSpec, mix: &MixConfig, output_path: P) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.binary_path, format!("Mixing {} clips", spec.clips.len()))
            .quiet()
            .overwrite()
            .input(&spec.background);

        for clip in &spec.clips {
            cmd = cmd.input(&clip.path);
        }

        cmd.filter_complex(spec.to_filter_graph())
            .map(format!("[{}]", MixSpec::OUTPUT_LABEL))
            .audio_codec(&mix.audio_codec)
            .audio_bitrate(&mix.audio_bitrate)
            .output(output_path)
    }

    /// Replace the video's audio with the dub track, copying both streams
    pub fn mux_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P, output_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Muxing dubbed audio")
            .quiet()
            .overwrite()
            .input(video_path)
            .input(audio_path)
            .map("0:v:0")
            .map("1:a:0")
            .video_codec("copy")
            .audio_codec("copy")
            .arg("-shortest")
            .output(output_path)
    }
}
