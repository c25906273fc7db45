//! Places synthesized clips on a timeline over the background track.
//!
//! Dialogue clips are summed and combined with the background without
//! normalization, so the dialogue level does not depend on how many clips
//! there are.

use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::MixConfig;
use crate::segment::{SegmentId, TtsClip};

/// A clip input with its timeline offset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayedClip {
    pub segment_id: SegmentId,
    pub path: PathBuf,
    pub delay_ms: u64,
}

/// Everything needed to render the dub track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixSpec {
    pub background: PathBuf,
    pub clips: Vec<DelayedClip>,
    pub background_gain: f64,
    pub dialogue_gain: f64,
    pub sample_rate: u32,
    pub channel_layout: String,
}

impl MixSpec {
    /// Label of the final mixed stream in the filter graph
    pub const OUTPUT_LABEL: &'static str = "out";

    fn aformat(&self) -> String {
        format!(
            "aformat=sample_rates={}:channel_layouts={}",
            self.sample_rate, self.channel_layout
        )
    }

    /// ffmpeg filter graph. Input 0 is the background, input i+1 is clip i.
    pub fn to_filter_graph(&self) -> String {
        let aformat = self.aformat();
        let mut chains = vec![format!("[0:a]{}[bg]", aformat)];
        let mut dialogue_inputs = String::new();

        for (idx, clip) in self.clips.iter().enumerate() {
            chains.push(format!(
                "[{}:a]{},adelay={delay}|{delay}[tts{}]",
                idx + 1,
                aformat,
                idx,
                delay = clip.delay_ms
            ));
            let _ = write!(dialogue_inputs, "[tts{}]", idx);
        }

        chains.push(format!(
            "{}amix=inputs={}:normalize=0:dropout_transition=0[dialogue]",
            dialogue_inputs,
            self.clips.len()
        ));
        chains.push(format!("[bg]volume={}[bg_quiet]", self.background_gain));
        chains.push(format!("[dialogue]volume={}[dialogue_loud]", self.dialogue_gain));
        chains.push(format!(
            "[bg_quiet][dialogue_loud]amix=inputs=2:duration=first:normalize=0:dropout_transition=0[{}]",
            Self::OUTPUT_LABEL
        ));

        chains.join(";")
    }
}

/// Timeline offset of a clip in whole milliseconds
pub fn delay_ms(start: f64) -> u64 {
    (start * 1000.0).round().max(0.0) as u64
}

pub struct TrackCompositor {
    config: MixConfig,
}

impl TrackCompositor {
    pub fn new(config: MixConfig) -> Self {
        Self { config }
    }

    /// Build the mix, or None when there is nothing to place (the background is used as is).
    pub fn compose(&self, background: &Path, clips: &[TtsClip]) -> Option<MixSpec> {
        if clips.is_empty() {
            info!("No clips to mix, background stays unchanged");
            return None;
        }

        let clips: Vec<DelayedClip> = clips
            .iter()
            .map(|clip| DelayedClip {
                segment_id: clip.segment_id,
                path: clip.path.clone(),
                delay_ms: delay_ms(clip.start),
            })
            .collect();

        debug!("Composed mix of {} clips over {}", clips.len(), background.display());

        Some(MixSpec {
            background: background.to_path_buf(),
            clips,
            background_gain: self.config.background_gain,
            dialogue_gain: self.config.dialogue_gain,
            sample_rate: self.config.sample_rate,
            channel_layout: self.config.channel_layout.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(id: SegmentId, start: f64) -> TtsClip {
        TtsClip {
            segment_id: id,
            path: PathBuf::from(format!("segment_{}.mp3", id)),
            start,
            duration: 1.0,
            speed_factor: 1.0,
        }
    }

    #[test]
    fn test_delays_and_gains() {
        let compositor = TrackCompositor::new(MixConfig::default());
        let spec = compositor
            .compose(Path::new("bg.mp3"), &[clip(0, 0.0), clip(1, 5.0), clip(2, 9.0)])
            .unwrap();

        let delays: Vec<u64> = spec.clips.iter().map(|c| c.delay_ms).collect();
        assert_eq!(delays, vec![0, 5000, 9000]);

        let graph = spec.to_filter_graph();
        assert!(graph.contains("[3:a]aformat=sample_rates=44100:channel_layouts=stereo,adelay=9000|9000[tts2]"));
        assert!(graph.contains("[tts0][tts1][tts2]amix=inputs=3:normalize=0"));
        assert!(graph.contains("[bg]volume=0.4[bg_quiet]"));
        assert!(graph.contains("[dialogue]volume=2.5[dialogue_loud]"));
        assert!(graph.ends_with("amix=inputs=2:duration=first:normalize=0:dropout_transition=0[out]"));
    }

    #[test]
    fn test_dialogue_gain_independent_of_clip_count() {
        let compositor = TrackCompositor::new(MixConfig::default());
        let one = compositor.compose(Path::new("bg.mp3"), &[clip(0, 1.0)]).unwrap();
        let many: Vec<TtsClip> = (0..12).map(|i| clip(i, i as f64)).collect();
        let twelve = compositor.compose(Path::new("bg.mp3"), &many).unwrap();

        assert!(one.to_filter_graph().contains("[dialogue]volume=2.5["));
        assert!(twelve.to_filter_graph().contains("[dialogue]volume=2.5["));
        assert_eq!(twelve.to_filter_graph().matches("normalize=0").count(), 2);
    }

    #[test]
    fn test_compose_is_deterministic() {
        let compositor = TrackCompositor::new(MixConfig::default());
        let clips = [clip(0, 0.4444), clip(3, 12.0006)];
        let first = compositor.compose(Path::new("bg.mp3"), &clips).unwrap();
        let second = compositor.compose(Path::new("bg.mp3"), &clips).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.clips[0].delay_ms, 444);
        assert_eq!(first.clips[1].delay_ms, 12001);
    }

    #[test]
    fn test_empty_clip_list_has_no_mix() {
        let compositor = TrackCompositor::new(MixConfig::default());
        assert!(compositor.compose(Path::new("bg.mp3"), &[]).is_none());
    }

    #[test]
    fn test_delay_rounding() {
        assert_eq!(delay_ms(2.0004), 2000);
        assert_eq!(delay_ms(2.0006), 2001);
        assert_eq!(delay_ms(-0.2), 0);
    }
}
