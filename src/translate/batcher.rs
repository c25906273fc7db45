use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::budget::{word_count, DurationBudget};
use crate::config::TranslateConfig;
use crate::segment::{Emotion, Segment, SegmentId, TranslationState};
use super::{TranslatedItem, TranslationItem, Translator};

/// Bounded retry with exponential backoff plus a cooldown between successful batches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub cooldown: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TranslateConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_secs_f64(config.backoff_base_secs.max(0.0)),
            cooldown: Duration::from_secs_f64(config.cooldown_secs.max(0.0)),
        }
    }

    /// Wait after failed attempt `attempt` (0-based): base * 2^attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Result of submitting one batch
#[derive(Debug)]
pub enum BatchOutcome {
    Translated { items: Vec<TranslatedItem>, attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

/// What happened to every segment during translation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranslationReport {
    pub batches: usize,
    pub translated: usize,
    /// Segments whose batch exhausted its retries
    pub failed: Vec<SegmentId>,
    /// Segments the translator silently left out
    pub missing: Vec<SegmentId>,
    /// Ids the translator returned that were not in the batch
    pub unexpected: Vec<SegmentId>,
    pub failed_batches: Vec<usize>,
    /// Translated segments whose text exceeds the word budget
    pub over_budget: Vec<SegmentId>,
}

impl TranslationReport {
    /// True when no segment fell back to source text
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.missing.is_empty()
    }
}

pub struct TranslationBatcher<'a> {
    translator: &'a dyn Translator,
    policy: RetryPolicy,
    batch_size: usize,
    budget: DurationBudget,
}

impl<'a> TranslationBatcher<'a> {
    pub fn new(translator: &'a dyn Translator, config: &TranslateConfig) -> Self {
        Self {
            translator,
            policy: RetryPolicy::from_config(config),
            batch_size: config.batch_size.max(1),
            budget: DurationBudget::from_config(config),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Request item for one segment, including its word budget
    pub fn build_item(&self, segment: &Segment) -> TranslationItem {
        let duration = segment.duration();
        TranslationItem {
            id: segment.id,
            source_text: segment.transcript.trim().to_string(),
            speaker: segment.speaker,
            timestamp: format!("{:.2}s - {:.2}s", segment.start, segment.end),
            duration_sec: (duration * 100.0).round() / 100.0,
            max_words_allowed: self.budget.max_words(segment.start, segment.end),
        }
    }

    /// Submit one batch, retrying failures with backoff.
    pub async fn submit_batch(&self, items: &[TranslationItem], target_language: &str) -> BatchOutcome {
        let mut last_error = String::new();

        for attempt in 0..self.policy.max_attempts {
            match self.translator.translate_batch(items, target_language).await {
                Ok(translated) if !translated.is_empty() => {
                    return BatchOutcome::Translated {
                        items: translated,
                        attempts: attempt + 1,
                    };
                }
                Ok(_) => {
                    last_error = "empty response".to_string();
                    warn!("│ Attempt {} returned no translations", attempt + 1);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("│ Attempt {} failed: {}", attempt + 1, e);
                }
            }

            let wait = self.policy.backoff(attempt);
            debug!("│ Backing off for {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        BatchOutcome::Failed {
            attempts: self.policy.max_attempts,
            last_error,
        }
    }

    /// Translate segments in place. Every segment stays in the list; segments that
    /// could not be translated keep their source text and are tagged accordingly.
    pub async fn translate_segments(
        &self,
        segments: &mut [Segment],
        target_language: &str,
    ) -> TranslationReport {
        let mut report = TranslationReport::default();

        let pending: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_blank())
            .map(|(idx, _)| idx)
            .collect();

        if pending.is_empty() {
            info!("Nothing to translate");
            return report;
        }

        let batches: Vec<&[usize]> = pending.chunks(self.batch_size).collect();
        report.batches = batches.len();
        info!(
            "Translating {} segments to {} in {} batches",
            pending.len(),
            target_language,
            batches.len()
        );

        for (batch_idx, indices) in batches.iter().enumerate() {
            let items: Vec<TranslationItem> = indices.iter().map(|&i| self.build_item(&segments[i])).collect();

            info!("┌─ Translating batch {}/{} ({} segments) ────────", batch_idx + 1, batches.len(), items.len());

            match self.submit_batch(&items, target_language).await {
                BatchOutcome::Translated { items: translated, attempts } => {
                    info!("│ Received {} translations after {} attempt(s)", translated.len(), attempts);
                    merge_batch(segments, indices, translated, &self.budget, &mut report);
                    info!("└─────────────────────────────────────");

                    if batch_idx + 1 < batches.len() {
                        tokio::time::sleep(self.policy.cooldown).await;
                    }
                }
                BatchOutcome::Failed { attempts, last_error } => {
                    warn!("│ Batch failed after {} attempts: {}", attempts, last_error);
                    warn!("│ Keeping source text for {} segments", indices.len());
                    warn!("└─────────────────────────────────────");
                    report.failed_batches.push(batch_idx);
                    for &i in indices.iter() {
                        segments[i].translation = TranslationState::Failed;
                        report.failed.push(segments[i].id);
                    }
                }
            }
        }

        info!(
            "Translation finished: {} translated, {} failed, {} missing",
            report.translated,
            report.failed.len(),
            report.missing.len()
        );
        report
    }
}

/// Apply one batch's answer to its segments, joining on segment id.
pub fn merge_batch(
    segments: &mut [Segment],
    indices: &[usize],
    translated: Vec<TranslatedItem>,
    budget: &DurationBudget,
    report: &mut TranslationReport,
) {
    let expected: Vec<SegmentId> = indices.iter().map(|&i| segments[i].id).collect();

    let mut by_id: HashMap<SegmentId, TranslatedItem> = HashMap::new();
    for item in translated {
        if !expected.contains(&item.id) {
            warn!("│ Ignoring translation for unexpected segment id {}", item.id);
            report.unexpected.push(item.id);
            continue;
        }
        if by_id.contains_key(&item.id) {
            warn!("│ Duplicate translation for segment {}, keeping the first", item.id);
            continue;
        }
        by_id.insert(item.id, item);
    }

    for &i in indices {
        let segment = &mut segments[i];
        match by_id.remove(&segment.id) {
            Some(item) => {
                let limit = budget.max_words(segment.start, segment.end) as usize;
                let words = word_count(&item.text);
                if words > limit {
                    debug!("│ Segment {} uses {} words, budget {}", segment.id, words, limit);
                    report.over_budget.push(segment.id);
                }

                info!("│ [{:.1}s] Speaker {}: {}", segment.start, segment.speaker, item.text);
                segment.transcript = item.text;
                segment.emotion = Some(
                    item.emotion
                        .as_deref()
                        .map(Emotion::from_tag)
                        .unwrap_or_default(),
                );
                segment.translation = TranslationState::Translated;
                report.translated += 1;
            }
            None => {
                warn!("│ Missing translation for segment {} at {:.2}s", segment.id, segment.start);
                segment.translation = TranslationState::Missing;
                report.missing.push(segment.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RedubError;
    use crate::translate::MockTranslator;
    use mockall::Sequence;

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::ZERO,
            cooldown: Duration::ZERO,
        }
    }

    fn segments(count: u32) -> Vec<Segment> {
        (0..count)
            .map(|i| Segment::new(i, i as f64 * 2.0, i as f64 * 2.0 + 1.5, i % 2, format!("line {}", i)).unwrap())
            .collect()
    }

    fn echo(items: &[TranslationItem]) -> Vec<TranslatedItem> {
        items
            .iter()
            .map(|item| TranslatedItem {
                id: item.id,
                text: format!("translated {}", item.id),
                emotion: Some("happy".to_string()),
            })
            .collect()
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::from_config(&TranslateConfig::default());
        assert_eq!(policy.backoff(0), Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(2), Duration::from_secs(20));
        assert_eq!(policy.cooldown, Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_item_carries_budget() {
        let translator = MockTranslator::new();
        let batcher = TranslationBatcher::new(&translator, &TranslateConfig::default());
        let segment = Segment::new(4, 10.0, 12.0, 1, " Where were you? ").unwrap();

        let item = batcher.build_item(&segment);
        assert_eq!(item.id, 4);
        assert_eq!(item.max_words_allowed, 5);
        assert_eq!(item.duration_sec, 2.0);
        assert_eq!(item.timestamp, "10.00s - 12.00s");
        assert_eq!(item.source_text, "Where were you?");
    }

    #[tokio::test]
    async fn test_batches_of_five_all_translated() {
        let mut translator = MockTranslator::new();
        translator
            .expect_translate_batch()
            .times(3)
            .withf(|items, lang| items.len() <= 5 && lang == "hi")
            .returning(|items, _| Ok(echo(items)));

        let batcher = TranslationBatcher::new(&translator, &TranslateConfig::default()).with_policy(no_wait());
        let mut list = segments(12);
        let report = batcher.translate_segments(&mut list, "hi").await;

        assert_eq!(list.len(), 12);
        assert_eq!(report.batches, 3);
        assert_eq!(report.translated, 12);
        assert!(report.is_complete());
        assert!(list.iter().all(|s| s.translation == TranslationState::Translated));
        assert_eq!(list[7].transcript, "translated 7");
        assert_eq!(list[7].emotion, Some(Emotion::Happy));
        // timing never changes
        assert_eq!(list[7].start, 14.0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mut translator = MockTranslator::new();
        let mut seq = Sequence::new();
        translator
            .expect_translate_batch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(RedubError::Translation("HTTP 503".to_string())));
        translator
            .expect_translate_batch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Vec::new()));
        translator
            .expect_translate_batch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|items, _| Ok(echo(items)));

        let batcher = TranslationBatcher::new(&translator, &TranslateConfig::default()).with_policy(no_wait());
        let mut list = segments(3);
        let report = batcher.translate_segments(&mut list, "ta").await;

        assert_eq!(report.translated, 3);
        assert!(report.failed_batches.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_batch_keeps_source_text() {
        let mut translator = MockTranslator::new();
        let mut seq = Sequence::new();
        translator
            .expect_translate_batch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|items, _| Ok(echo(items)));
        translator
            .expect_translate_batch()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(RedubError::Translation("unparseable".to_string())));

        let batcher = TranslationBatcher::new(&translator, &TranslateConfig::default()).with_policy(no_wait());
        let mut list = segments(8);
        let report = batcher.translate_segments(&mut list, "te").await;

        assert_eq!(list.len(), 8);
        assert_eq!(report.translated, 5);
        assert_eq!(report.failed, vec![5, 6, 7]);
        assert_eq!(report.failed_batches, vec![1]);
        assert_eq!(list[6].transcript, "line 6");
        assert_eq!(list[6].translation, TranslationState::Failed);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_merge_tolerates_missing_and_unexpected_ids() {
        let mut translator = MockTranslator::new();
        translator.expect_translate_batch().times(1).returning(|_, _| {
            Ok(vec![
                TranslatedItem { id: 0, text: "zero".to_string(), emotion: Some("furious".to_string()) },
                TranslatedItem { id: 99, text: "stray".to_string(), emotion: None },
                TranslatedItem { id: 2, text: "two".to_string(), emotion: None },
            ])
        });

        let batcher = TranslationBatcher::new(&translator, &TranslateConfig::default()).with_policy(no_wait());
        let mut list = segments(3);
        let report = batcher.translate_segments(&mut list, "hi").await;

        assert_eq!(list.len(), 3);
        assert_eq!(list[0].transcript, "zero");
        assert_eq!(list[0].emotion, Some(Emotion::Neutral));
        assert_eq!(list[1].transcript, "line 1");
        assert_eq!(list[1].translation, TranslationState::Missing);
        assert_eq!(report.missing, vec![1]);
        assert_eq!(report.unexpected, vec![99]);
        assert_eq!(report.translated, 2);
    }

    #[tokio::test]
    async fn test_blank_segments_are_not_sent() {
        let mut translator = MockTranslator::new();
        translator
            .expect_translate_batch()
            .times(1)
            .withf(|items, _| items.len() == 1 && items[0].id == 1)
            .returning(|items, _| Ok(echo(items)));

        let batcher = TranslationBatcher::new(&translator, &TranslateConfig::default()).with_policy(no_wait());
        let mut list = vec![
            Segment::new(0, 0.0, 1.0, 0, "   ").unwrap(),
            Segment::new(1, 1.0, 2.0, 0, "hello").unwrap(),
        ];
        let report = batcher.translate_segments(&mut list, "hi").await;

        assert_eq!(report.translated, 1);
        assert_eq!(list[0].translation, TranslationState::Source);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_batch_waits_full_backoff() {
        let mut translator = MockTranslator::new();
        translator
            .expect_translate_batch()
            .times(3)
            .returning(|_, _| Err(RedubError::Translation("HTTP 500".to_string())));

        let batcher = TranslationBatcher::new(&translator, &TranslateConfig::default());
        let mut list = segments(2);
        let started = tokio::time::Instant::now();
        let report = batcher.translate_segments(&mut list, "hi").await;

        // 5s + 10s + 20s, no cooldown after a failed batch
        assert_eq!(started.elapsed().as_secs(), 35);
        assert_eq!(report.failed, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_only_between_batches() {
        let mut translator = MockTranslator::new();
        translator
            .expect_translate_batch()
            .times(3)
            .returning(|items, _| Ok(echo(items)));

        let batcher = TranslationBatcher::new(&translator, &TranslateConfig::default());
        let mut list = segments(15);
        let started = tokio::time::Instant::now();
        let report = batcher.translate_segments(&mut list, "hi").await;

        assert_eq!(started.elapsed().as_secs(), 4);
        assert_eq!(report.translated, 15);
    }

    #[test]
    fn test_over_budget_is_reported_not_truncated() {
        let mut list = vec![Segment::new(0, 0.0, 1.0, 0, "hi").unwrap()];
        let mut report = TranslationReport::default();
        merge_batch(
            &mut list,
            &[0],
            vec![TranslatedItem { id: 0, text: "one two three four five".to_string(), emotion: None }],
            &DurationBudget::default(),
            &mut report,
        );
        assert_eq!(report.over_budget, vec![0]);
        assert_eq!(list[0].transcript, "one two three four five");
    }
}
