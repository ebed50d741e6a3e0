//! Constraint-enforced article summarization (C6).
//!
//! The protocol is hash-gated and idempotent: the same prompt version over
//! the same article text never calls the backend twice. Out-of-range drafts
//! get exactly one repair call; a result still under the floor is dropped
//! without persisting anything.

use crate::ai::TextGenerator;
use crate::db::Db;
use bluegrass_core::config::AppConfig;
use bluegrass_core::models::{ItemAiSummary, ReviewReason};
use bluegrass_core::extract::truncate_chars;
use bluegrass_core::summary::{
    clean_summary, trim_to_word_limit, within_bounds, word_count, MIN_ARTICLE_CHARS,
    PROMPT_VERSION, SOURCE_TEXT_CAP, SUMMARY_MAX_WORDS, SUMMARY_MIN_WORDS,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

const MAX_TOKENS: u32 = 900;
const TEMPERATURE: f32 = 0.2;

/// Hash of (prompt version, truncated article text); either changing
/// re-invalidates the stored summary.
pub fn source_hash(article_text: &str) -> String {
    let capped = truncate_chars(article_text, SOURCE_TEXT_CAP);
    let mut hasher = Sha256::new();
    hasher.update(PROMPT_VERSION.as_bytes());
    hasher.update(b":");
    hasher.update(capped.as_bytes());
    hex::encode(hasher.finalize())
}

fn summary_prompt(title: &str, url: &str, article_text: &str) -> String {
    format!(
        "Summarize the following news article in {SUMMARY_MIN_WORDS} to {SUMMARY_MAX_WORDS} words.\n\
         Rules:\n\
         - Plain text only: no bullet points, no headings, no markdown.\n\
         - Do not invent facts that are not in the article.\n\
         - Do not open with \"Summary:\" or similar preamble.\n\n\
         Title: {title}\n\
         URL: {url}\n\n\
         Article:\n{}",
        truncate_chars(article_text, SOURCE_TEXT_CAP)
    )
}

fn repair_prompt(title: &str, article_text: &str, prior: &str) -> String {
    let prior_words = word_count(prior);
    format!(
        "The summary below has {prior_words} words, which is outside the required \
         {SUMMARY_MIN_WORDS}-{SUMMARY_MAX_WORDS} word range. Rewrite it so the word count \
         falls inside that range. Plain text only, no bullets, no headings, no invented facts.\n\n\
         Title: {title}\n\n\
         Previous attempt:\n{prior}\n\n\
         Article:\n{}",
        truncate_chars(article_text, SOURCE_TEXT_CAP)
    )
}

fn summary_cache_key(item_id: &str) -> String {
    format!("summary:{item_id}")
}

/// Generate (or return the cached) summary for an item. Returns None when
/// the article is too short, the backend fails, or the repaired draft is
/// still under the word floor.
pub async fn summarize_item(
    db: &Db,
    ai: &dyn TextGenerator,
    cfg: &AppConfig,
    item_id: &str,
    title: &str,
    url: &str,
    article_text: &str,
) -> Result<Option<String>, String> {
    if article_text.chars().count() < MIN_ARTICLE_CHARS {
        return Ok(None);
    }

    let hash = source_hash(article_text);
    if let Some(row) = db.get_ai_summary(item_id)? {
        if row.source_hash == hash {
            return Ok(Some(row.summary));
        }
    }

    if !ai.is_configured() {
        return Ok(None);
    }

    let raw = match ai
        .generate(&summary_prompt(title, url, article_text), MAX_TOKENS, TEMPERATURE)
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(item_id, error = %e, "Summary generation failed");
            let _ = db.insert_error_event("summarize", &e, cfg.error_event_ttl_days);
            return Ok(None);
        }
    };

    let mut text = clean_summary(&raw);
    let mut reason = ReviewReason::AutoGenerated;

    if !within_bounds(&text) {
        reason = if word_count(&text) < SUMMARY_MIN_WORDS {
            ReviewReason::SummaryTooShort
        } else {
            ReviewReason::SummaryTooLong
        };
        let repaired = match ai
            .generate(&repair_prompt(title, article_text, &text), MAX_TOKENS, TEMPERATURE)
            .await
        {
            Ok(repaired) => repaired,
            Err(e) => {
                warn!(item_id, error = %e, "Summary repair failed");
                let _ = db.insert_error_event("summarize", &e, cfg.error_event_ttl_days);
                return Ok(None);
            }
        };
        text = clean_summary(&repaired);
        if word_count(&text) > SUMMARY_MAX_WORDS {
            text = trim_to_word_limit(&text, SUMMARY_MAX_WORDS);
        }
        if word_count(&text) < SUMMARY_MIN_WORDS {
            info!(item_id, words = word_count(&text), "Summary still under floor, dropping");
            return Ok(None);
        }
    }

    db.upsert_ai_summary(&ItemAiSummary {
        item_id: item_id.into(),
        summary: text.clone(),
        model: ai.model().into(),
        source_hash: hash,
        generated_at: Utc::now().to_rfc3339(),
    })?;
    db.kv_set(
        &summary_cache_key(item_id),
        &text,
        cfg.summary_cache_ttl_seconds,
    )?;
    db.update_item_summary(item_id, &text)?;
    db.upsert_review(item_id, reason.as_str())?;

    info!(item_id, words = word_count(&text), reason = reason.as_str(), "Summary stored");
    Ok(Some(text))
}

/// Cached read used by the API; a summary that no longer satisfies the
/// current bounds is treated as absent.
pub fn get_cached_summary(db: &Db, item_id: &str) -> Option<String> {
    let cached = db
        .kv_get(&summary_cache_key(item_id))
        .ok()
        .flatten()
        .or_else(|| {
            db.get_ai_summary(item_id)
                .ok()
                .flatten()
                .map(|row| row.summary)
        })?;
    within_bounds(&cached).then_some(cached)
}
