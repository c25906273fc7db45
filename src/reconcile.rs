//! Synthesizes each translated segment and fits the clip to its original slot.

use futures_util::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SynthesisConfig;
use crate::media::MediaProcessorTrait;
use crate::segment::{Segment, SegmentId, TtsClip};
use crate::synthesis::{SpeechSynthesizer, SynthesisRequest};

/// When and how far a clip may be sped up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoPlan {
    /// Clip must exceed target * tolerance before it is corrected
    pub tolerance: f64,
    /// Slots this short are left alone
    pub min_target_secs: f64,
    pub max_factor: f64,
}

impl Default for TempoPlan {
    fn default() -> Self {
        Self {
            tolerance: 1.05,
            min_target_secs: 0.5,
            max_factor: 1.3,
        }
    }
}

impl TempoPlan {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            tolerance: config.speed_tolerance,
            min_target_secs: config.min_correctable_secs,
            max_factor: config.max_speed_factor.max(1.0),
        }
    }

    /// Speed factor for a clip of `measured` seconds in a slot of `target` seconds,
    /// or None when the clip fits well enough. Result is within [1.0, max_factor].
    pub fn factor(&self, measured: f64, target: f64) -> Option<f64> {
        if measured > target * self.tolerance && target > self.min_target_secs {
            Some((measured / target).clamp(1.0, self.max_factor))
        } else {
            None
        }
    }
}

/// What the tempo step did to a clip
#[derive(Debug, Clone, PartialEq)]
pub enum TempoResult {
    NotNeeded,
    Applied(f64),
    /// Correction was needed but failed; the uncorrected clip is used
    Failed(String),
}

/// Result of reconciling one segment
#[derive(Debug, Clone, PartialEq)]
pub enum ClipOutcome {
    Ready { clip: TtsClip, tempo: TempoResult },
    Skipped { segment_id: SegmentId, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSegment {
    pub segment_id: SegmentId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub synthesized: usize,
    pub corrected: usize,
    pub blank: usize,
    pub tempo_failures: usize,
    pub skipped: Vec<SkippedSegment>,
}

pub struct TtsReconciler<'a> {
    synthesizer: &'a dyn SpeechSynthesizer,
    media: &'a dyn MediaProcessorTrait,
    tempo: TempoPlan,
    cooldown: Duration,
    max_in_flight: usize,
    language: String,
    clip_dir: PathBuf,
    progress: Option<ProgressBar>,
}

impl<'a> TtsReconciler<'a> {
    pub fn new(
        synthesizer: &'a dyn SpeechSynthesizer,
        media: &'a dyn MediaProcessorTrait,
        config: &SynthesisConfig,
        language: impl Into<String>,
        clip_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            synthesizer,
            media,
            tempo: TempoPlan::from_config(config),
            cooldown: Duration::from_secs_f64(config.cooldown_secs.max(0.0)),
            max_in_flight: config.max_in_flight.max(1),
            language: language.into(),
            clip_dir: clip_dir.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    fn clip_path(&self, id: SegmentId, suffix: &str) -> PathBuf {
        self.clip_dir.join(format!("segment_{}{}.mp3", id, suffix))
    }

    /// Synthesize every non-blank segment. Clips come back in segment order.
    pub async fn reconcile(&self, segments: &[Segment]) -> (Vec<TtsClip>, ReconcileReport) {
        let mut report = ReconcileReport::default();

        let work: Vec<&Segment> = segments
            .iter()
            .filter(|s| {
                let blank = s.is_blank();
                if blank {
                    report.blank += 1;
                }
                !blank
            })
            .collect();

        if let Err(e) = tokio::fs::create_dir_all(&self.clip_dir).await {
            warn!("Cannot create clip directory {}: {}", self.clip_dir.display(), e);
            report.skipped = work
                .iter()
                .map(|s| SkippedSegment {
                    segment_id: s.id,
                    reason: format!("clip directory unavailable: {}", e),
                })
                .collect();
            return (Vec::new(), report);
        }

        info!("Synthesizing {} segments ({} in flight)", work.len(), self.max_in_flight);
        if let Some(pb) = &self.progress {
            pb.set_length(work.len() as u64);
        }

        let outcomes: Vec<ClipOutcome> = stream::iter(work)
            .map(|segment| self.reconcile_segment(segment))
            .buffered(self.max_in_flight)
            .collect()
            .await;

        let mut clips = Vec::new();
        for outcome in outcomes {
            match outcome {
                ClipOutcome::Ready { clip, tempo } => {
                    report.synthesized += 1;
                    match tempo {
                        TempoResult::Applied(_) => report.corrected += 1,
                        TempoResult::Failed(_) => report.tempo_failures += 1,
                        TempoResult::NotNeeded => {}
                    }
                    clips.push(clip);
                }
                ClipOutcome::Skipped { segment_id, reason } => {
                    report.skipped.push(SkippedSegment { segment_id, reason });
                }
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_with_message("synthesis done");
        }

        info!(
            "Synthesized {} clips ({} sped up, {} skipped, {} blank)",
            report.synthesized,
            report.corrected,
            report.skipped.len(),
            report.blank
        );
        (clips, report)
    }

    /// Synthesize, measure and tempo-correct one segment. Never fails; problems become `Skipped`.
    pub async fn reconcile_segment(&self, segment: &Segment) -> ClipOutcome {
        let outcome = self.reconcile_inner(segment).await;
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        outcome
    }

    async fn reconcile_inner(&self, segment: &Segment) -> ClipOutcome {
        let skipped = |reason: String| {
            warn!("│ Segment {} skipped: {}", segment.id, reason);
            ClipOutcome::Skipped {
                segment_id: segment.id,
                reason,
            }
        };

        let raw_path = self.clip_path(segment.id, "");
        let request = SynthesisRequest {
            text: segment.transcript.trim().to_string(),
            speaker: segment.speaker,
            language: self.language.clone(),
        };

        if let Err(e) = self.synthesizer.synthesize(&request, &raw_path).await {
            return skipped(format!("synthesis failed: {}", e));
        }
        tokio::time::sleep(self.cooldown).await;

        if !raw_path.exists() {
            return skipped("synthesizer produced no file".to_string());
        }

        let measured = match self.media.probe_duration(&raw_path).await {
            Ok(d) => d,
            Err(e) => return skipped(format!("duration probe failed: {}", e)),
        };

        let target = segment.duration();
        let (path, duration, tempo) = match self.tempo.factor(measured, target) {
            None => (raw_path, measured, TempoResult::NotNeeded),
            Some(factor) => self.apply_tempo(segment.id, raw_path, measured, target, factor).await,
        };

        let speed_factor = match tempo {
            TempoResult::Applied(f) => f,
            _ => 1.0,
        };

        ClipOutcome::Ready {
            clip: TtsClip {
                segment_id: segment.id,
                path,
                start: segment.start,
                duration,
                speed_factor,
            },
            tempo,
        }
    }

    async fn apply_tempo(
        &self,
        id: SegmentId,
        raw_path: PathBuf,
        measured: f64,
        target: f64,
        factor: f64,
    ) -> (PathBuf, f64, TempoResult) {
        let fast_path = self.clip_path(id, "_fast");
        debug!("│ Segment {}: {:.2}s clip for {:.2}s slot, speeding up x{:.3}", id, measured, target, factor);

        if let Err(e) = self.media.change_tempo(&raw_path, &fast_path, factor).await {
            warn!("│ Tempo change for segment {} failed, keeping original: {}", id, e);
            return (raw_path, measured, TempoResult::Failed(e.to_string()));
        }
        if !fast_path.exists() {
            warn!("│ Tempo change for segment {} produced no file, keeping original", id);
            return (raw_path, measured, TempoResult::Failed("no output file".to_string()));
        }

        let duration = self
            .media
            .probe_duration(&fast_path)
            .await
            .unwrap_or(measured / factor);
        (fast_path, duration, TempoResult::Applied(factor))
    }
}
