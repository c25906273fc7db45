//! redub - automated video dubbing
//!
//! Entry point for the redub command line: recognize speech, translate it,
//! synthesize a new dialogue track and mix it back over the original
//! background audio.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use redub::cli::{Args, Commands};
use redub::config::{Config, RecognitionMode, TranslationProvider};
use redub::error::RedubError;
use redub::pipeline::DubbingPipeline;
use redub::recognize::{load_deepgram_json, RecognizerFactory};
use redub::segment::{load_segments, save_segments};
use redub::segmenter::SegmentBuilder;
use redub::synthesis::SynthesizerFactory;
use redub::translate::{ensure_supported_target, TranslationBatcher, TranslatorFactory, SUPPORTED_TARGET_LANGUAGES};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;
    info!("Starting redub");

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("redub.toml").exists() {
                info!("Found redub.toml in current directory, loading...");
                Config::from_file("redub.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Dub { input, target_lang, output_dir, provider } => {
            apply_provider(&mut config, provider.as_deref())?;
            let target = target_lang.unwrap_or_else(|| config.pipeline.target_language.clone());

            let pipeline = DubbingPipeline::new(config)?.with_progress(true);
            let report = pipeline.process_single_file(&input, &target, output_dir.as_ref()).await?;

            print_timings(&report.timings);
            println!("Dubbed video: {}", report.output_video.display());
        }
        Commands::Batch { input_dir, target_lang, output_dir, provider } => {
            apply_provider(&mut config, provider.as_deref())?;
            let target = target_lang.unwrap_or_else(|| config.pipeline.target_language.clone());

            let pipeline = DubbingPipeline::new(config)?.with_progress(true);
            let reports = pipeline.process_directory(&input_dir, &target, output_dir.as_ref()).await?;
            println!("Dubbed {} video(s)", reports.len());
        }
        Commands::Extract { input, output } => {
            info!("Extracting audio from: {}", input.display());
            let pipeline = DubbingPipeline::new(config)?;
            pipeline.extract_audio(&input, &output).await?;
        }
        Commands::Transcribe { input, output, language, mode, deepgram_json } => {
            if let Some(mode) = mode {
                config.recognition.mode = parse_recognition_mode(&mode)?;
            }
            let language = language.or_else(|| config.pipeline.source_language.clone());

            let recognized = match deepgram_json {
                Some(json_path) => {
                    info!("Loading saved recognition response: {}", json_path.display());
                    load_deepgram_json(&json_path, config.recognition.mode).await?
                }
                None => {
                    info!("Transcribing audio: {}", input.display());
                    let recognizer = RecognizerFactory::create_recognizer(config.recognition.clone(), language)?;
                    recognizer.recognize(&input).await?
                }
            };

            let segments = recognized.into_segments(&SegmentBuilder::new(config.segmentation.clone()));
            save_segments(&segments, &output).await?;
            println!("Wrote {} segments to {}", segments.len(), output.display());
        }
        Commands::Translate { input, output, target_lang, provider } => {
            apply_provider(&mut config, provider.as_deref())?;
            let target = target_lang.unwrap_or_else(|| config.pipeline.target_language.clone());
            ensure_supported_target(&target)?;

            let mut segments = load_segments(&input).await?;
            let translator = TranslatorFactory::create_translator(config.translate.clone())?;
            translator.check_availability().await?;

            let report = TranslationBatcher::new(translator.as_ref(), &config.translate)
                .translate_segments(&mut segments, &target)
                .await;
            save_segments(&segments, &output).await?;

            println!(
                "Translated {}/{} segments ({} failed, {} missing)",
                report.translated,
                segments.len(),
                report.failed.len(),
                report.missing.len()
            );
        }
        Commands::Synthesize { input, background, output, target_lang, video, video_output } => {
            let target = target_lang.unwrap_or_else(|| config.pipeline.target_language.clone());
            ensure_supported_target(&target)?;
            let segments = load_segments(&input).await?;
            let clip_dir = config.pipeline.work_dir.join(format!("clips_{}", target));

            let synthesizer = SynthesizerFactory::create_synthesizer(config.synthesis.clone())?;
            let pipeline = DubbingPipeline::new(config)?.with_progress(true);
            let outcome = pipeline
                .dub_audio_with(synthesizer.as_ref(), &background, &segments, &target, &clip_dir, &output)
                .await?;

            if !outcome.mixed {
                warn!("Nothing was mixed, copying the background to {}", output.display());
                tokio::fs::copy(&background, &output).await?;
            }

            if let Some(video) = video {
                let video_output = video_output.unwrap_or_else(|| {
                    let stem = video.file_stem().unwrap_or_default().to_string_lossy();
                    video.with_file_name(format!("{}_{}.mp4", stem, target))
                });
                pipeline.mux(&video, &output, &video_output).await?;
                println!("Dubbed video: {}", video_output.display());
            }
        }
        Commands::Languages => {
            println!("\nSupported target languages:");
            println!("{:<6} {:<12}", "Code", "Language");
            println!("{}", "-".repeat(20));
            for (code, name) in SUPPORTED_TARGET_LANGUAGES {
                println!("{:<6} {:<12}", code, name);
            }
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(RedubError::Config(format!(
                    "{} already exists, use --force to overwrite",
                    output.display()
                ))
                .into());
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    info!("redub completed successfully");
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".redub").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation
    let file_appender = rolling::daily(&log_dir, "redub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("redub.log").display());

    Ok(())
}

fn print_timings(timings: &redub::pipeline::StepTimings) {
    println!("\nStep timings:");
    for (step, secs) in [
        ("extract audio", timings.extract_audio),
        ("separation", timings.separation),
        ("transcribe", timings.transcribe),
        ("translate", timings.translate),
        ("synthesize", timings.synthesize),
        ("merge video", timings.merge_video),
        ("total", timings.total),
    ] {
        println!("  {:<14} {}", step, format_duration(secs));
    }
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    if whole < 60 {
        format!("{:.1}s", seconds.max(0.0))
    } else if whole < 3600 {
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        format!("{}h {}m", whole / 3600, (whole % 3600) / 60)
    }
}

fn apply_provider(config: &mut Config, provider: Option<&str>) -> Result<()> {
    if let Some(provider) = provider {
        config.translate.provider = parse_provider(provider)?;
    }
    Ok(())
}

/// Parse translation provider from string
fn parse_provider(provider: &str) -> Result<TranslationProvider> {
    match provider.to_lowercase().as_str() {
        "ollama" => Ok(TranslationProvider::Ollama),
        "gemini" => Ok(TranslationProvider::Gemini),
        _ => Err(RedubError::Config(format!(
            "Invalid translation provider '{}'. Valid providers: ollama, gemini",
            provider
        )).into()),
    }
}

/// Parse recognition mode from string
fn parse_recognition_mode(mode: &str) -> Result<RecognitionMode> {
    match mode.to_lowercase().as_str() {
        "utterances" => Ok(RecognitionMode::Utterances),
        "words" => Ok(RecognitionMode::Words),
        _ => Err(RedubError::Config(format!(
            "Invalid recognition mode '{}'. Valid modes: utterances, words",
            mode
        )).into()),
    }
}
