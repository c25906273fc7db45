//! Word budgets that keep translated lines speakable within their slot.

use crate::config::TranslateConfig;

/// Sustainable speech rate assumed for natural dialogue
pub const WORDS_PER_SECOND: f64 = 2.5;

/// Smallest budget handed to the translator, so very short lines never force an empty translation
pub const MIN_WORDS: u32 = 3;

/// `max(3, floor((end - start) * 2.5))`
pub fn max_words(start: f64, end: f64) -> u32 {
    DurationBudget::default().max_words(start, end)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationBudget {
    words_per_second: f64,
    min_words: u32,
}

impl Default for DurationBudget {
    fn default() -> Self {
        Self {
            words_per_second: WORDS_PER_SECOND,
            min_words: MIN_WORDS,
        }
    }
}

impl DurationBudget {
    pub fn new(words_per_second: f64, min_words: u32) -> Self {
        Self {
            words_per_second,
            min_words,
        }
    }

    pub fn from_config(config: &TranslateConfig) -> Self {
        Self::new(config.words_per_second, config.min_words)
    }

    pub fn max_words(&self, start: f64, end: f64) -> u32 {
        let raw = ((end - start) * self.words_per_second).floor();
        if !raw.is_finite() || raw <= self.min_words as f64 {
            return self.min_words;
        }
        // `as` saturates for values beyond u32::MAX
        raw as u32
    }
}

/// Whitespace word count, used to report translations that overrun their budget
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_examples() {
        assert_eq!(max_words(10.0, 12.0), 5);
        assert_eq!(max_words(0.0, 0.4), 3);
        assert_eq!(max_words(0.0, 1.6), 4);
        assert_eq!(max_words(0.0, 10.0), 25);
    }

    #[test]
    fn test_degenerate_spans_get_floor() {
        assert_eq!(max_words(5.0, 5.0), 3);
        assert_eq!(max_words(5.0, 1.0), 3);
        assert_eq!(max_words(0.0, f64::NAN), 3);
        assert_eq!(max_words(0.0, f64::INFINITY), 3);
    }

    #[test]
    fn test_budget_monotonic_and_floored() {
        let mut previous = 0;
        for step in 0..2000 {
            let duration = step as f64 * 0.05;
            let budget = max_words(100.0, 100.0 + duration);
            assert!(budget >= 3);
            assert!(budget >= previous, "budget dropped at {}s", duration);
            previous = budget;
        }
    }

    #[test]
    fn test_custom_rate() {
        let budget = DurationBudget::new(3.0, 2);
        assert_eq!(budget.max_words(0.0, 0.5), 2);
        assert_eq!(budget.max_words(0.0, 2.0), 6);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  नमस्ते  दोस्त \n कैसे "), 3);
        assert_eq!(word_count(""), 0);
    }
}
