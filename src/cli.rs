use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dub a single video file
    Dub {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Target language code (defaults to pipeline.target_language)
        #[arg(short, long)]
        target_lang: Option<String>,

        /// Output directory for the dubbed video and report
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Translation provider (ollama, gemini)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Dub all video files in a directory
    Batch {
        /// Input directory containing video files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Target language code (defaults to pipeline.target_language)
        #[arg(short, long)]
        target_lang: Option<String>,

        /// Output directory for dubbed videos and reports
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Translation provider (ollama, gemini)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Extract audio from video file
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Recognize speech and write segments JSON
    Transcribe {
        /// Input audio file (ideally the separated vocals)
        #[arg(short, long)]
        input: PathBuf,

        /// Output segments JSON
        #[arg(short, long)]
        output: PathBuf,

        /// Source language hint
        #[arg(short, long)]
        language: Option<String>,

        /// Segmentation mode (utterances, words)
        #[arg(long)]
        mode: Option<String>,

        /// Use a saved Deepgram response instead of calling the service
        #[arg(long)]
        deepgram_json: Option<PathBuf>,
    },

    /// Translate a segments JSON file
    Translate {
        /// Input segments JSON
        #[arg(short, long)]
        input: PathBuf,

        /// Output segments JSON
        #[arg(short, long)]
        output: PathBuf,

        /// Target language code (defaults to pipeline.target_language)
        #[arg(short, long)]
        target_lang: Option<String>,

        /// Translation provider (ollama, gemini)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Synthesize translated segments and mix them over a background track
    Synthesize {
        /// Input segments JSON (translated)
        #[arg(short, long)]
        input: PathBuf,

        /// Background track (separated non-vocal stem)
        #[arg(short, long)]
        background: PathBuf,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,

        /// Target language code, selects the voice profile
        #[arg(short, long)]
        target_lang: Option<String>,

        /// Also mux the result into this video
        #[arg(long)]
        video: Option<PathBuf>,

        /// Output video path when --video is given
        #[arg(long, requires = "video")]
        video_output: Option<PathBuf>,
    },

    /// List supported target languages
    Languages,

    /// Write the default configuration to a file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "redub.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
