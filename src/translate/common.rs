use std::time::Duration;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, RedubError};
use crate::segment::SegmentId;
use super::{TranslatedItem, TranslationItem};

/// Target languages with voice coverage for dubbing
pub const SUPPORTED_TARGET_LANGUAGES: &[(&str, &str)] = &[
    ("hi", "Hindi"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("kn", "Kannada"),
    ("ml", "Malayalam"),
    ("mr", "Marathi"),
    ("bn", "Bengali"),
    ("gu", "Gujarati"),
    ("pa", "Punjabi"),
];

/// Fail early for a target language that cannot be dubbed
pub fn ensure_supported_target(code: &str) -> Result<&'static str> {
    let code = code.trim().to_lowercase();
    SUPPORTED_TARGET_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .ok_or_else(|| {
            let supported: Vec<&str> = SUPPORTED_TARGET_LANGUAGES.iter().map(|(c, _)| *c).collect();
            RedubError::UnsupportedLanguage(format!(
                "'{}' (supported: {})",
                code,
                supported.join(", ")
            ))
        })
}

/// Convert language code to full language name for clearer prompts
pub fn language_code_to_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "en" => "English".to_string(),
        "hi" => "Hindi".to_string(),
        "ta" => "Tamil".to_string(),
        "te" => "Telugu".to_string(),
        "kn" => "Kannada".to_string(),
        "ml" => "Malayalam".to_string(),
        "mr" => "Marathi".to_string(),
        "bn" => "Bengali".to_string(),
        "gu" => "Gujarati".to_string(),
        "pa" => "Punjabi".to_string(),
        "as" => "Assamese".to_string(),
        "or" => "Odia".to_string(),
        "ur" => "Urdu".to_string(),
        "ja" => "Japanese".to_string(),
        "ko" => "Korean".to_string(),
        "zh" => "Chinese".to_string(),
        "fr" => "French".to_string(),
        "de" => "German".to_string(),
        "es" => "Spanish".to_string(),
        "it" => "Italian".to_string(),
        "pt" => "Portuguese".to_string(),
        "ru" => "Russian".to_string(),
        "ar" => "Arabic".to_string(),
        _ => code.to_string(), // Fallback to the code itself if not found
    }
}

/// HTTP client shared by translation backends
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(RedubError::Http)
}

/// Build the dubbing prompt for one batch
pub fn build_batch_prompt(
    items: &[TranslationItem],
    source_language: Option<&str>,
    target_language: &str,
) -> Result<String> {
    let target_name = language_code_to_name(target_language);
    let source_name = source_language
        .map(language_code_to_name)
        .unwrap_or_else(|| "the source language".to_string());
    let segments_json = serde_json::to_string_pretty(items)?;

    Ok(format!(
        "You are a professional dubbing translator for video and film content.\n\
         Translate each dialogue line from {source} to {target} and detect its emotion.\n\
         \n\
         RULES:\n\
         1. DURATION: every line has 'duration_sec' and 'max_words_allowed'. The translation MUST NOT\n\
            exceed 'max_words_allowed' words, otherwise the dubbed speech overruns its slot.\n\
            Prefer shorter synonyms and natural contractions; summarize if needed, keeping the core meaning.\n\
         2. CONTEXT: 'timestamp' shows when the line is spoken. Use neighbouring lines for conversation flow.\n\
         3. SPEAKERS: 'speaker' identifies the voice. Keep each speaker's style consistent.\n\
         4. STYLE: natural, conversational {target}, the way native speakers talk. Not bookish.\n\
         \n\
         Return ONLY JSON in the form {{\"translations\":[{{\"id\":0,\"text\":\"...\",\"emotion\":\"neutral\"}}]}}.\n\
         Copy every 'id' exactly. 'emotion' is one of: neutral, happy, sad, angry, fearful, surprised.\n\
         \n\
         [Dialogue lines]\n\
         {lines}\n",
        source = source_name,
        target = target_name,
        lines = segments_json,
    ))
}

/// Parse a translator answer into items.
///
/// Accepts a bare JSON array, an object wrapping the array (any array-valued
/// field), markdown code fences and prose around the JSON. Items without an id
/// or a text are skipped. An answer with no usable items is an error.
pub fn parse_translation_response(raw: &str) -> Result<Vec<TranslatedItem>> {
    let value = parse_json_flexible(raw).ok_or_else(|| {
        RedubError::Translation(format!("Unparseable translation response: {}", preview(raw)))
    })?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(entries) => Some(entries),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let items: Vec<TranslatedItem> = entries.iter().filter_map(item_from_value).collect();

    if items.is_empty() {
        return Err(RedubError::Translation(format!(
            "Translation response contained no usable items: {}",
            preview(raw)
        )));
    }

    debug!("Parsed {} translated items", items.len());
    Ok(items)
}

fn item_from_value(value: &Value) -> Option<TranslatedItem> {
    let id = match value.get("id")? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    let id = SegmentId::try_from(id).ok()?;

    let text = value.get("text")?.as_str()?.trim().to_string();
    if text.is_empty() {
        warn!("Translator returned empty text for segment {}", id);
        return None;
    }

    let emotion = value
        .get("emotion")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string());

    Some(TranslatedItem { id, text, emotion })
}

/// Try to parse JSON with various common wrappers
fn parse_json_flexible(text: &str) -> Option<Value> {
    let text = text.trim();

    // 1. Direct JSON
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    // 2. Markdown code blocks
    let cleaned = remove_markdown_code_blocks(text);
    if cleaned != text {
        if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
            return Some(value);
        }
    }

    // 3. JSON embedded in prose: outermost array first, then outermost object
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (cleaned.find(open), cleaned.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

/// Remove markdown code fences from text
fn remove_markdown_code_blocks(text: &str) -> String {
    let text = text.trim();

    if let Some(inner) = text.strip_prefix("```json").and_then(|t| t.strip_suffix("```")) {
        return inner.trim().to_string();
    }
    if let Some(inner) = text.strip_prefix("```").and_then(|t| t.strip_suffix("```")) {
        return inner.trim().to_string();
    }

    text.to_string()
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(120) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_targets() {
        assert_eq!(ensure_supported_target("HI").unwrap(), "Hindi");
        assert!(matches!(
            ensure_supported_target("xx"),
            Err(RedubError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_parse_bare_array() {
        let items = parse_translation_response(
            r#"[{"id": 0, "text": "नमस्ते", "emotion": "happy"}, {"id": 1, "text": "ठीक है"}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].emotion.as_deref(), Some("happy"));
        assert_eq!(items[1].emotion, None);
    }

    #[test]
    fn test_parse_wrapped_and_fenced() {
        let raw = "```json\n{\"translations\": [{\"id\": \"7\", \"text\": \" வணக்கம் \"}]}\n```";
        let items = parse_translation_response(raw).unwrap();
        assert_eq!(items[0].id, 7);
        assert_eq!(items[0].text, "வணக்கம்");
    }

    #[test]
    fn test_parse_prose_around_json() {
        let raw = "Sure! Here you go:\n[{\"id\": 2.0, \"text\": \"hola\"}]\nLet me know.";
        let items = parse_translation_response(raw).unwrap();
        assert_eq!(items[0].id, 2);
    }

    #[test]
    fn test_parse_skips_unusable_items() {
        let raw = r#"[{"id": 1}, {"text": "no id"}, {"id": -3, "text": "negative"}, {"id": 4, "text": "ok"}]"#;
        let items = parse_translation_response(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 4);
    }

    #[test]
    fn test_structurally_empty_is_error() {
        assert!(parse_translation_response("[]").is_err());
        assert!(parse_translation_response("{\"translations\": []}").is_err());
        assert!(parse_translation_response("I cannot help with that").is_err());
        assert!(parse_translation_response("").is_err());
    }

    #[test]
    fn test_prompt_carries_budget_and_ids() {
        let items = vec![TranslationItem {
            id: 12,
            source_text: "Where were you last night?".to_string(),
            speaker: 1,
            timestamp: "10.0s - 12.0s".to_string(),
            duration_sec: 2.0,
            max_words_allowed: 5,
        }];
        let prompt = build_batch_prompt(&items, Some("en"), "ta").unwrap();
        assert!(prompt.contains("from English to Tamil"));
        assert!(prompt.contains("\"max_words_allowed\": 5"));
        assert!(prompt.contains("\"id\": 12"));
    }
}
