use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Result, RedubError};
use crate::media::{DemucsSeparator, MediaProcessorFactory, MediaProcessorTrait, SeparatedStems, VocalSeparator};
use crate::mix::TrackCompositor;
use crate::recognize::{Recognizer, RecognizerFactory};
use crate::reconcile::{ReconcileReport, TtsReconciler};
use crate::segment::{save_segments, Segment};
use crate::segmenter::SegmentBuilder;
use crate::synthesis::{SpeechSynthesizer, SynthesizerFactory};
use crate::translate::{ensure_supported_target, TranslationBatcher, TranslationReport, Translator, TranslatorFactory};

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

/// Wall-clock seconds spent in each step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepTimings {
    pub extract_audio: f64,
    pub separation: f64,
    pub transcribe: f64,
    pub translate: f64,
    pub synthesize: f64,
    pub merge_video: f64,
    pub total: f64,
}

/// Summary of one dubbing run, written next to the output video
#[derive(Debug, Clone, Serialize)]
pub struct DubbingReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub input: PathBuf,
    pub output_video: PathBuf,
    pub target_language: String,
    pub segment_count: usize,
    /// "[Speaker n] text" per recognized segment
    pub transcript: String,
    pub translation: TranslationReport,
    /// None when synthesis could not start
    pub synthesis: Option<ReconcileReport>,
    pub timings: StepTimings,
}

impl DubbingReport {
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content).await?;
        info!("Report saved to {}", path.as_ref().display());
        Ok(())
    }
}

/// Result of the synthesize-and-mix stage
#[derive(Debug, Clone, PartialEq)]
pub struct DubOutcome {
    /// The mixed dub track, or the untouched background
    pub audio: PathBuf,
    pub mixed: bool,
    pub report: Option<ReconcileReport>,
}

impl DubOutcome {
    fn unchanged(background: &Path, report: Option<ReconcileReport>) -> Self {
        Self {
            audio: background.to_path_buf(),
            mixed: false,
            report,
        }
    }
}

/// Render speaker-tagged transcript lines
pub fn transcript_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| format!("[Speaker {}] {}", s.speaker, s.transcript))
        .collect::<Vec<_>>()
        .join("\n")
}

fn stem_of(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| RedubError::InvalidInput(format!("Invalid filename: {}", path.display())))
}

pub struct DubbingPipeline {
    config: Config,
    media: Box<dyn MediaProcessorTrait>,
    separator: Box<dyn VocalSeparator>,
    show_progress: bool,
}

impl DubbingPipeline {
    pub fn new(config: Config) -> Result<Self> {
        let media = MediaProcessorFactory::create_processor(config.media.clone(), config.mix.clone());
        let separator = Box::new(DemucsSeparator::new(config.separation.clone()));

        // Check dependencies
        media.check_availability()?;

        Ok(Self::with_components(config, media, separator))
    }

    pub fn with_components(
        config: Config,
        media: Box<dyn MediaProcessorTrait>,
        separator: Box<dyn VocalSeparator>,
    ) -> Self {
        Self {
            config,
            media,
            separator,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn work_dir_for(&self, video_stem: &str) -> PathBuf {
        self.config.pipeline.work_dir.join(video_stem)
    }

    /// Dub a single video file
    pub async fn process_single_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        target_language: &str,
        output_dir: Option<Q>,
    ) -> Result<DubbingReport> {
        let input_path = input_path.as_ref();
        info!("Processing single file: {}", input_path.display());

        if !input_path.exists() {
            return Err(RedubError::FileNotFound(input_path.display().to_string()));
        }

        let output_dir = match output_dir {
            Some(dir) => dir.as_ref().to_path_buf(),
            None => input_path.parent()
                .ok_or_else(|| RedubError::Config("Cannot determine output directory".to_string()))?
                .to_path_buf(),
        };
        fs::create_dir_all(&output_dir).await?;

        self.dub_video_file(input_path, &output_dir, target_language).await
    }

    /// Dub every video in a directory, continuing past failures
    pub async fn process_directory<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_dir: P,
        target_language: &str,
        output_dir: Option<Q>,
    ) -> Result<Vec<DubbingReport>> {
        let input_dir = input_dir.as_ref();
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(RedubError::Config("Input path is not a directory".to_string()));
        }

        let output_dir = match output_dir {
            Some(dir) => dir.as_ref().to_path_buf(),
            None => input_dir.to_path_buf(),
        };
        fs::create_dir_all(&output_dir).await?;

        let video_files = find_videos(input_dir, &output_dir, target_language);
        info!("Found {} video files to process", video_files.len());

        let mut reports = Vec::new();
        for video_path in video_files {
            match self.dub_video_file(&video_path, &output_dir, target_language).await {
                Ok(report) => {
                    info!("Successfully processed: {}", video_path.display());
                    reports.push(report);
                }
                Err(e) => warn!("Failed to process {}: {}", video_path.display(), e),
            }
        }

        Ok(reports)
    }

    /// Build collaborators from configuration and run every step for one video.
    async fn dub_video_file(&self, video_path: &Path, output_dir: &Path, target_language: &str) -> Result<DubbingReport> {
        ensure_supported_target(target_language)?;

        let recognizer = RecognizerFactory::create_recognizer(
            self.config.recognition.clone(),
            self.config.pipeline.source_language.clone(),
        )?;
        let translator = TranslatorFactory::create_translator(self.config.translate.clone())?;
        translator.check_availability().await?;

        let synthesizer = match SynthesizerFactory::create_synthesizer(self.config.synthesis.clone()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Speech synthesis unavailable, the background will be used as is: {}", e);
                None
            }
        };

        self.run(
            video_path,
            output_dir,
            target_language,
            recognizer.as_ref(),
            translator.as_ref(),
            synthesizer.as_deref(),
        )
        .await
    }

    /// Run every step with the given collaborators
    pub async fn run(
        &self,
        video_path: &Path,
        output_dir: &Path,
        target_language: &str,
        recognizer: &dyn Recognizer,
        translator: &dyn Translator,
        synthesizer: Option<&dyn SpeechSynthesizer>,
    ) -> Result<DubbingReport> {
        let language_name = ensure_supported_target(target_language)?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_total = Instant::now();
        let mut timings = StepTimings::default();

        let video_stem = stem_of(video_path)?;
        let work_dir = self.work_dir_for(&video_stem);
        fs::create_dir_all(&work_dir).await?;

        info!("Dubbing {} into {} (run {})", video_path.display(), language_name, run_id);

        // Step 1: extract
        info!("--- Step 1: Extracting audio ---");
        let t0 = Instant::now();
        let original_audio = work_dir.join(format!("{}_original.wav", video_stem));
        self.media.extract_audio(video_path, &original_audio).await?;
        timings.extract_audio = t0.elapsed().as_secs_f64();

        // Step 2: separate
        info!("--- Step 2: Separating vocals ---");
        let t0 = Instant::now();
        let stems = self.separate(&original_audio, &work_dir.join("separated")).await?;
        timings.separation = t0.elapsed().as_secs_f64();

        // Step 3: transcribe
        info!("--- Step 3: Transcribing ---");
        let t0 = Instant::now();
        let mut segments = self.transcribe_with(recognizer, &stems.vocals).await?;
        timings.transcribe = t0.elapsed().as_secs_f64();
        let transcript = transcript_text(&segments);
        save_segments(&segments, work_dir.join("segments.json")).await?;

        // Step 4: translate
        info!("--- Step 4: Translating ---");
        let t0 = Instant::now();
        let translation = self.translate_with(translator, &mut segments, target_language).await;
        timings.translate = t0.elapsed().as_secs_f64();
        save_segments(&segments, work_dir.join(format!("segments_{}.json", target_language))).await?;

        // Step 5: synthesize and mix
        info!("--- Step 5: Synthesizing & mixing ---");
        let t0 = Instant::now();
        let dubbed_audio = work_dir.join(format!("{}_dubbed_{}.aac", video_stem, target_language));
        let clip_dir = work_dir.join(format!("clips_{}", target_language));
        let dub = match synthesizer {
            Some(synthesizer) => {
                self.dub_audio_with(synthesizer, &stems.background, &segments, target_language, &clip_dir, &dubbed_audio)
                    .await?
            }
            None => DubOutcome::unchanged(&stems.background, None),
        };
        timings.synthesize = t0.elapsed().as_secs_f64();

        // Step 6: mux
        info!("--- Step 6: Merging video ---");
        let t0 = Instant::now();
        let output_video = output_dir.join(format!("{}_{}.mp4", video_stem, target_language));
        self.media.mux_audio(video_path, &dub.audio, &output_video).await?;
        timings.merge_video = t0.elapsed().as_secs_f64();

        timings.total = start_total.elapsed().as_secs_f64();
        info!("Dubbing finished in {:.1}s: {}", timings.total, output_video.display());

        let report = DubbingReport {
            run_id,
            started_at,
            input: video_path.to_path_buf(),
            output_video: output_video.clone(),
            target_language: target_language.to_string(),
            segment_count: segments.len(),
            transcript,
            translation,
            synthesis: dub.report,
            timings,
        };
        report
            .save(output_dir.join(format!("{}_{}.report.json", video_stem, target_language)))
            .await?;

        Ok(report)
    }

    /// Extract the audio track from a video
    pub async fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> Result<()> {
        self.media.extract_audio(video_path.as_ref(), audio_path.as_ref()).await
    }

    /// Split audio into dialogue and background stems
    pub async fn separate(&self, audio_path: &Path, output_dir: &Path) -> Result<SeparatedStems> {
        self.separator.separate(audio_path, output_dir).await
    }

    /// Recognize speech and cut it into segments
    pub async fn transcribe_with(&self, recognizer: &dyn Recognizer, audio_path: &Path) -> Result<Vec<Segment>> {
        let output = recognizer.recognize(audio_path).await?;
        let builder = SegmentBuilder::new(self.config.segmentation.clone());
        let segments = output.into_segments(&builder);

        if segments.is_empty() {
            warn!("No speech recognized in {}", audio_path.display());
        } else {
            info!("Recognized {} segments", segments.len());
        }
        Ok(segments)
    }

    /// Translate segments in place; failures degrade to source text
    pub async fn translate_with(
        &self,
        translator: &dyn Translator,
        segments: &mut [Segment],
        target_language: &str,
    ) -> TranslationReport {
        TranslationBatcher::new(translator, &self.config.translate)
            .translate_segments(segments, target_language)
            .await
    }

    /// Synthesize clips and mix them over the background. Without anything to
    /// place, the background itself is the result.
    pub async fn dub_audio_with(
        &self,
        synthesizer: &dyn SpeechSynthesizer,
        background: &Path,
        segments: &[Segment],
        target_language: &str,
        clip_dir: &Path,
        output_path: &Path,
    ) -> Result<DubOutcome> {
        if segments.is_empty() {
            warn!("No segments to dub");
            return Ok(DubOutcome::unchanged(background, None));
        }

        let mut reconciler = TtsReconciler::new(
            synthesizer,
            self.media.as_ref(),
            &self.config.synthesis,
            target_language,
            clip_dir,
        );
        if self.show_progress {
            reconciler = reconciler.with_progress(synthesis_progress_bar(segments.len()));
        }

        let (clips, report) = reconciler.reconcile(segments).await;

        let compositor = TrackCompositor::new(self.config.mix.clone());
        match compositor.compose(background, &clips) {
            Some(spec) => {
                self.media.render_mix(&spec, output_path).await?;
                Ok(DubOutcome {
                    audio: output_path.to_path_buf(),
                    mixed: true,
                    report: Some(report),
                })
            }
            None => {
                warn!("No speech was synthesized");
                Ok(DubOutcome::unchanged(background, Some(report)))
            }
        }
    }

    /// Put the dub track into the video
    pub async fn mux<P: AsRef<Path>>(&self, video_path: P, audio_path: P, output_path: P) -> Result<()> {
        self.media
            .mux_audio(video_path.as_ref(), audio_path.as_ref(), output_path.as_ref())
            .await
    }
}

fn synthesis_progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} clips ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Videos under `input_dir`, skipping our own outputs for this language
fn find_videos(input_dir: &Path, output_dir: &Path, target_language: &str) -> Vec<PathBuf> {
    let output_suffix = format!("_{}", target_language);

    WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter(|path| {
            let is_output = path.parent() == Some(output_dir)
                && path.file_stem()
                    .map(|s| s.to_string_lossy().ends_with(&output_suffix))
                    .unwrap_or(false);
            !is_output
        })
        .collect()
}
