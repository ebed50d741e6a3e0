//! Length constraints and response handling for generated summaries.
//!
//! The AI backend is fronted by the server crate; everything here is pure
//! text so the bounds logic stays testable without a live backend.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const SUMMARY_MIN_WORDS: usize = 200;
pub const SUMMARY_MAX_WORDS: usize = 400;

/// Bumping this invalidates every cached summary via the source hash.
pub const PROMPT_VERSION: &str = "summary-v2";

/// Characters of article text that participate in the source hash and the
/// prompt.
pub const SOURCE_TEXT_CAP: usize = 20_000;

/// Minimum article length worth summarizing at all.
pub const MIN_ARTICLE_CHARS: usize = 300;

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

pub fn within_bounds(s: &str) -> bool {
    let words = word_count(s);
    (SUMMARY_MIN_WORDS..=SUMMARY_MAX_WORDS).contains(&words)
}

/// Accept the response shapes the backend is known to produce: a bare
/// string, `{response}`, `{result:{response}}`, or `{content:[{text}]}`.
pub fn parse_ai_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get("response") {
                return Some(s.clone());
            }
            if let Some(result) = map.get("result") {
                if let Some(Value::String(s)) = result.get("response") {
                    return Some(s.clone());
                }
            }
            if let Some(Value::Array(blocks)) = map.get("content") {
                let text: String = blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("");
                if !text.is_empty() {
                    return Some(text);
                }
            }
            None
        }
        _ => None,
    }
}

/// Drop a chatty lead-in ("Summary:", "Here is a summary of ...") and
/// normalize whitespace.
pub fn clean_summary(raw: &str) -> String {
    static PREAMBLE: OnceLock<Regex> = OnceLock::new();
    let preamble = PREAMBLE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(summary\s*:|here\s+is\s+(a|the)\s+summary[^:\n]*:?|here's\s+(a|the)\s+summary[^:\n]*:?)\s*")
            .unwrap()
    });
    let stripped = preamble.replace(raw.trim(), "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim to the word ceiling, ending at a sentence boundary when one exists
/// inside the kept window. The result always ends with closing punctuation.
pub fn trim_to_word_limit(s: &str, max_words: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    let kept = words[..max_words].join(" ");

    // Prefer the last completed sentence inside the window.
    if let Some(idx) = kept.rfind(['.', '!', '?']) {
        let cut = kept[..=idx].trim().to_string();
        if word_count(&cut) >= SUMMARY_MIN_WORDS {
            return cut;
        }
    }
    format!("{kept}.")
}
