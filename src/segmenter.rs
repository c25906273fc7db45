//! Turns a diarized word stream into dialogue segments.
//!
//! A segment closes when the speaker changes, when the pause before the next
//! word exceeds the pause threshold, or when the segment is already long and
//! the next word follows a small pause. Length alone never splits mid-phrase.

use tracing::{debug, info, warn};

use crate::config::SegmentationConfig;
use crate::segment::{Segment, SegmentId, WordToken};

/// Why a segment was closed before the next token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitReason {
    SpeakerChange,
    Pause,
    Length,
}

pub struct SegmentBuilder {
    config: SegmentationConfig,
}

/// Words collected for the segment currently being built
struct OpenSegment {
    speaker: u32,
    start: f64,
    end: f64,
    words: Vec<String>,
}

impl OpenSegment {
    fn open(token: &WordToken) -> Self {
        Self {
            speaker: token.speaker_tag,
            start: token.start_offset,
            end: token.end_offset,
            words: vec![token.text.trim().to_string()],
        }
    }

    fn push(&mut self, token: &WordToken) {
        self.end = token.end_offset;
        self.words.push(token.text.trim().to_string());
    }

    fn close(self, id: SegmentId) -> Segment {
        Segment {
            id,
            start: self.start,
            end: self.end,
            speaker: self.speaker,
            transcript: self.words.join(" "),
            emotion: None,
            translation: Default::default(),
        }
    }
}

impl SegmentBuilder {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    /// Decide whether `token` must start a new segment.
    pub fn split_reason(&self, current: &OpenSegmentView, token: &WordToken) -> Option<SplitReason> {
        let gap = token.start_offset - current.last_end;

        if token.speaker_tag != current.speaker {
            return Some(SplitReason::SpeakerChange);
        }
        if gap > self.config.pause_split_secs {
            return Some(SplitReason::Pause);
        }
        if token.start_offset - current.start > self.config.max_span_secs
            && gap > self.config.soft_split_gap_secs
        {
            return Some(SplitReason::Length);
        }
        None
    }

    /// Build segments from tokens. Invalid and blank tokens are dropped; ids are 0..n.
    pub fn build(&self, tokens: Vec<WordToken>) -> Vec<Segment> {
        let mut tokens: Vec<WordToken> = tokens
            .into_iter()
            .filter(|token| match token.validate() {
                Ok(()) => !token.text.trim().is_empty(),
                Err(e) => {
                    warn!("Skipping token: {}", e);
                    false
                }
            })
            .collect();
        tokens.sort_by(|a, b| a.start_offset.total_cmp(&b.start_offset));

        let mut segments = Vec::new();
        let mut current: Option<OpenSegment> = None;

        for token in &tokens {
            match current.as_mut() {
                None => current = Some(OpenSegment::open(token)),
                Some(open) => {
                    let view = OpenSegmentView {
                        speaker: open.speaker,
                        start: open.start,
                        last_end: open.end,
                    };
                    if let Some(reason) = self.split_reason(&view, token) {
                        debug!(
                            "Closing segment at {:.2}s ({:?}) before '{}'",
                            open.end, reason, token.text
                        );
                        if let Some(done) = current.take() {
                            segments.push(done.close(segments.len() as SegmentId));
                        }
                        current = Some(OpenSegment::open(token));
                    } else {
                        open.push(token);
                    }
                }
            }
        }

        if let Some(done) = current {
            segments.push(done.close(segments.len() as SegmentId));
        }

        info!("Built {} segments from {} tokens", segments.len(), tokens.len());
        segments
    }
}

/// Timing summary of the open segment used by split decisions
#[derive(Debug, Clone, Copy)]
pub struct OpenSegmentView {
    pub speaker: u32,
    pub start: f64,
    pub last_end: f64,
}

/// Merge chunk-local token lists into one global, time-ordered stream.
/// Each chunk's offset is added to all of its tokens.
pub fn align_chunks(chunks: Vec<(f64, Vec<WordToken>)>) -> Vec<WordToken> {
    let mut tokens: Vec<WordToken> = chunks
        .into_iter()
        .flat_map(|(offset, tokens)| tokens.into_iter().map(move |t| t.shifted(offset)))
        .collect();
    tokens.sort_by(|a, b| a.start_offset.total_cmp(&b.start_offset));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> SegmentBuilder {
        SegmentBuilder::new(SegmentationConfig::default())
    }

    fn word(text: &str, start: f64, end: f64, speaker: u32) -> WordToken {
        WordToken::new(text, start, end, speaker)
    }

    #[test]
    fn test_empty_stream() {
        assert!(builder().build(Vec::new()).is_empty());
    }

    #[test]
    fn test_pause_and_speaker_split() {
        let segments = builder().build(vec![
            word("Hi", 0.0, 0.4, 0),
            word("there", 0.4, 0.8, 0),
            word("Bob", 2.0, 2.3, 1),
        ]);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, 0.8);
        assert_eq!(segments[0].speaker, 0);
        assert_eq!(segments[0].transcript, "Hi there");
        assert_eq!(segments[1].start, 2.0);
        assert_eq!(segments[1].end, 2.3);
        assert_eq!(segments[1].speaker, 1);
        assert_eq!(segments[1].transcript, "Bob");
        assert_eq!(segments[1].id, 1);
    }

    #[test]
    fn test_speaker_change_without_pause() {
        let segments = builder().build(vec![
            word("yes", 0.0, 0.3, 0),
            word("no", 0.3, 0.6, 2),
        ]);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].speaker, 2);
    }

    #[test]
    fn test_pause_threshold_is_exclusive() {
        let segments = builder().build(vec![
            word("one", 0.0, 0.5, 0),
            word("two", 1.2, 1.5, 0),
        ]);
        // gap of exactly 0.7s does not split
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].transcript, "one two");
    }

    #[test]
    fn test_length_alone_never_splits() {
        // continuous speech for 40s with 0.1s gaps
        let tokens: Vec<WordToken> = (0..100)
            .map(|i| word("la", i as f64 * 0.4, i as f64 * 0.4 + 0.3, 0))
            .collect();
        let segments = builder().build(tokens);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_soft_length_split_needs_small_pause() {
        let mut tokens: Vec<WordToken> = (0..80)
            .map(|i| word("la", i as f64 * 0.4, i as f64 * 0.4 + 0.3, 0))
            .collect();
        // 32.4s into the segment, after a 0.5s gap
        tokens.push(word("next", 32.4, 32.7, 0));

        let segments = builder().build(tokens);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].transcript, "next");
        assert_eq!(segments[1].start, 32.4);
    }

    #[test]
    fn test_skips_blank_and_invalid_tokens() {
        let segments = builder().build(vec![
            word("  ", 0.0, 0.1, 0),
            word("ok", 0.1, 0.3, 0),
            word("broken", 0.5, 0.2, 0),
            word("fine", 0.4, 0.6, 0),
        ]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].transcript, "ok fine");
        assert_eq!(segments[0].start, 0.1);
    }

    #[test]
    fn test_zero_length_tokens_are_kept() {
        let segments = builder().build(vec![
            word("uh", 3.0, 3.0, 0),
            word("right", 5.0, 5.4, 1),
        ]);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].transcript, "uh");
        assert_eq!(segments[0].start, 3.0);
        assert_eq!(segments[0].end, 3.0);
        assert_eq!(segments[0].duration(), 0.0);
    }

    #[test]
    fn test_segments_never_cross_boundaries() {
        let config = SegmentationConfig::default();
        let mut tokens = Vec::new();
        let mut t = 0.0;
        for i in 0..400u32 {
            let speaker = (i / 37) % 3;
            let gap = match i % 11 {
                0 => 0.9,
                5 => 0.35,
                _ => 0.05,
            };
            t += gap;
            tokens.push(word("w", t, t + 0.25, speaker));
            t += 0.25;
        }

        let segments = builder().build(tokens.clone());
        let total_words: usize = segments.iter().map(|s| s.transcript.split(' ').count()).sum();
        assert_eq!(total_words, tokens.len());

        for segment in &segments {
            let inside: Vec<&WordToken> = tokens
                .iter()
                .filter(|t| t.start_offset >= segment.start && t.end_offset <= segment.end)
                .collect();
            for pair in inside.windows(2) {
                let gap = pair[1].start_offset - pair[0].end_offset;
                assert_eq!(pair[1].speaker_tag, segment.speaker);
                assert!(gap <= config.pause_split_secs);
                assert!(
                    !(pair[1].start_offset - segment.start > config.max_span_secs
                        && gap > config.soft_split_gap_secs)
                );
            }
        }
    }

    #[test]
    fn test_align_chunks_shifts_to_global_time() {
        let tokens = align_chunks(vec![
            (60.0, vec![word("second", 0.5, 0.9, 1)]),
            (0.0, vec![word("first", 59.0, 59.5, 0)]),
        ]);
        assert_eq!(tokens[0].text, "first");
        assert_eq!(tokens[1].start_offset, 60.5);
        assert_eq!(tokens[1].end_offset, 60.9);
    }
}
