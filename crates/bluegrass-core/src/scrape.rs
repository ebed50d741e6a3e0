//! HTML listing scraper for sources that publish no usable feed.
//!
//! Candidate article links come from three strategies run over the same
//! listing page: structured ld+json blocks, anchor hrefs, and a loose URL
//! scan as the last resort. Candidates are scored by path shape, merged by
//! canonical URL, and the best few get their pages fetched for metadata.

use crate::canonical::canonicalize_url;
use crate::config::META_TIMEOUT;
use crate::extract::{self, strip_tags, truncate_chars, PageMeta};
use crate::models::{ParsedItem, ScraperKind};
use crate::parser::SNIPPET_MAX_CHARS;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

pub const MIN_CANDIDATE_SCORE: i32 = 30;
pub const META_FETCH_LIMIT: usize = 16;
pub const META_FETCH_CONCURRENCY: usize = 4;
const MAX_LDJSON_DEPTH: usize = 8;
const META_READ_CAP_BYTES: usize = 262_144;

#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub published_raw: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub score: i32,
}

const TOPICAL_PREFIXES: &[&str] = &[
    "/news/", "/local/", "/sports/", "/politics/", "/business/", "/weather/", "/education/",
    "/health/", "/crime/", "/community/", "/state/", "/region/",
];

const ASSET_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".css", ".js", ".ico", ".pdf", ".mp3",
    ".mp4", ".xml", ".json", ".woff", ".woff2",
];

const INDEX_PAGE_SEGMENTS: &[&str] = &[
    "/tag/", "/tags/", "/topic/", "/topics/", "/author/", "/authors/", "/staff/",
];

const GALLERY_SEGMENTS: &[&str] = &["/video/", "/videos/", "/photo/", "/photos/", "/gallery/"];

fn date_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\d{4}/\d{1,2}/\d{1,2}/").unwrap())
}

fn mcclatchy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/article\d+\.html$").unwrap())
}

/// Path-shape score. Penalties are monotonic: a link can only lose points
/// for looking like an asset, index page, search result, wire copy, or
/// gallery; it never earns them back.
pub fn score_candidate(kind: ScraperKind, url: &Url, title: Option<&str>) -> i32 {
    let path = url.path().to_lowercase();
    let mut score = 0i32;

    if title.map(|t| t.trim().chars().count() >= 12).unwrap_or(false) {
        score += 45;
    }
    if date_path_re().is_match(&path) {
        score += 70;
    }
    if TOPICAL_PREFIXES.iter().any(|p| path.starts_with(p)) {
        score += 40;
    }
    if url.path_segments().map(|s| s.count()).unwrap_or(0) >= 4 {
        score += 15;
    }

    let cms_bonus = match kind {
        ScraperKind::GannettStory => path.contains("/story/"),
        ScraperKind::TownnewsArticle => path
            .rsplit('/')
            .next()
            .map(|f| f.starts_with("article_") && f.ends_with(".html"))
            .unwrap_or(false),
        ScraperKind::McclatchyArticle => mcclatchy_re().is_match(&path),
        ScraperKind::GenericNews => false,
    };
    if cms_bonus {
        score += 60;
    }

    if ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        score -= 250;
    }
    if INDEX_PAGE_SEGMENTS.iter().any(|s| path.contains(s)) {
        score -= 140;
    }
    if path.contains("/search") || url.query().map(|q| q.contains("q=")).unwrap_or(false) {
        score -= 60;
    }
    if path.contains("/ap/") {
        score -= 25;
    }
    if GALLERY_SEGMENTS.iter().any(|s| path.contains(s)) {
        score -= 35;
    }

    score
}

// --- strategy 1: ld+json ---

fn ldjson_blocks(html: &str) -> Vec<Value> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<script[^>]+type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
            .unwrap()
    });
    re.captures_iter(html)
        .filter_map(|caps| serde_json::from_str(caps.get(1)?.as_str().trim()).ok())
        .collect()
}

fn node_type_matches(value: &Value, wanted: &[&str]) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => wanted.iter().any(|w| t.eq_ignore_ascii_case(w)),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(|t| t.as_str())
            .any(|t| wanted.iter().any(|w| t.eq_ignore_ascii_case(w))),
        _ => false,
    }
}

fn json_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("@id"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        Value::Array(items) => items.iter().find_map(json_url),
        _ => None,
    }
}

fn json_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("name").and_then(|v| v.as_str()).map(str::to_string),
        Value::Array(items) => items.iter().find_map(json_name),
        _ => None,
    }
}

fn walk_ldjson(value: &Value, depth: usize, out: &mut Vec<Candidate>) {
    if depth > MAX_LDJSON_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            let is_article = node_type_matches(
                value,
                &["NewsArticle", "ReportageNewsArticle", "Article", "BlogPosting"],
            );
            let is_list_item = node_type_matches(value, &["ListItem"]);

            if is_article || is_list_item {
                let url = map
                    .get("url")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .or_else(|| map.get("mainEntityOfPage").and_then(json_url))
                    .or_else(|| map.get("item").and_then(json_url));
                if let Some(url) = url {
                    let published_raw = map
                        .get("datePublished")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    out.push(Candidate {
                        url,
                        title: map
                            .get("headline")
                            .or_else(|| map.get("name"))
                            .and_then(|v| v.as_str())
                            .map(str::to_string),
                        snippet: map
                            .get("description")
                            .and_then(|v| v.as_str())
                            .map(str::to_string),
                        published: published_raw.as_deref().and_then(extract::parse_date),
                        published_raw,
                        author: map.get("author").and_then(json_name),
                        image_url: map.get("image").and_then(json_url),
                        score: 0,
                    });
                }
            }

            for child in map.values() {
                walk_ldjson(child, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_ldjson(item, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn ldjson_candidates(html: &str) -> Vec<Candidate> {
    let mut out = Vec::new();
    for block in ldjson_blocks(html) {
        walk_ldjson(&block, 0, &mut out);
    }
    out
}

// --- strategy 2: anchors ---

fn anchor_candidates(html: &str, base: &Url) -> Vec<Candidate> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<a[^>]+href\s*=\s*["']([^"'#]+)["'][^>]*>(.*?)</a>"#).unwrap()
    });
    re.captures_iter(html)
        .filter_map(|caps| {
            let href = caps.get(1)?.as_str().trim();
            let resolved = base.join(href).ok()?;
            let text = strip_tags(caps.get(2)?.as_str());
            Some(Candidate {
                url: resolved.to_string(),
                title: (!text.is_empty()).then_some(text),
                ..Candidate::default()
            })
        })
        .collect()
}

// --- strategy 3: loose URL scan ---

fn loose_candidates(html: &str) -> Vec<Candidate> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>\\)]+"#).unwrap());
    re.find_iter(html)
        .map(|m| Candidate {
            url: m.as_str().trim_end_matches(&['.', ',', ';'][..]).to_string(),
            ..Candidate::default()
        })
        .collect()
}

fn merge_fill(into: &mut Candidate, from: Candidate) {
    if into.title.is_none() {
        into.title = from.title;
    }
    if into.snippet.is_none() {
        into.snippet = from.snippet;
    }
    if into.published.is_none() {
        into.published = from.published;
        into.published_raw = from.published_raw;
    }
    if into.author.is_none() {
        into.author = from.author;
    }
    if into.image_url.is_none() {
        into.image_url = from.image_url;
    }
}

/// Run all three strategies, canonicalize, score, and merge by URL.
/// Candidates below the score floor are discarded; the result is sorted
/// best-first.
pub fn discover_candidates(html: &str, page_url: &Url, kind: ScraperKind) -> Vec<Candidate> {
    let listing_canonical = canonicalize_url(page_url.as_str());

    let mut merged: HashMap<String, Candidate> = HashMap::new();
    let raw = ldjson_candidates(html)
        .into_iter()
        .chain(anchor_candidates(html, page_url))
        .chain(loose_candidates(html));

    for mut candidate in raw {
        let Some(canonical) = canonicalize_url(&candidate.url) else {
            continue;
        };
        if Some(&canonical) == listing_canonical.as_ref() {
            continue;
        }
        let Ok(url) = Url::parse(&canonical) else {
            continue;
        };
        candidate.url = canonical.clone();
        candidate.score = score_candidate(kind, &url, candidate.title.as_deref());

        match merged.get_mut(&canonical) {
            Some(existing) => {
                if candidate.score > existing.score {
                    // Higher-score candidate wins contested fields.
                    let old = std::mem::replace(existing, candidate);
                    merge_fill(existing, old);
                } else {
                    merge_fill(existing, candidate);
                }
            }
            None => {
                merged.insert(canonical, candidate);
            }
        }
    }

    let mut candidates: Vec<Candidate> = merged
        .into_values()
        .filter(|c| c.score >= MIN_CANDIDATE_SCORE)
        .collect();
    candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.url.cmp(&b.url)));
    candidates
}

async fn fetch_page_meta(client: &reqwest::Client, url: &str) -> Option<PageMeta> {
    let response = client
        .get(url)
        .timeout(META_TIMEOUT)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let is_html = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
        .unwrap_or(true);
    if !is_html {
        return None;
    }
    let bytes = response.bytes().await.ok()?;
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(META_READ_CAP_BYTES)]);
    Some(extract::extract_meta(&head))
}

fn apply_meta(candidate: &mut Candidate, meta: PageMeta) {
    // The article page is authoritative for identity and publication time.
    if let Some(canonical) = meta.canonical_url.as_deref().and_then(canonicalize_url) {
        candidate.url = canonical;
    }
    if meta.published.is_some() {
        candidate.published = meta.published;
        candidate.published_raw = meta.published_raw;
    }
    if candidate.title.is_none() {
        candidate.title = meta.title;
    }
    if candidate.snippet.is_none() {
        candidate.snippet = meta.description;
    }
    if candidate.author.is_none() {
        candidate.author = meta.author;
    }
    if candidate.image_url.is_none() {
        candidate.image_url = meta.image_url;
    }
}

fn candidate_to_item(candidate: Candidate) -> Option<ParsedItem> {
    let title = candidate.title?.trim().to_string();
    if title.is_empty() {
        return None;
    }
    Some(ParsedItem {
        title,
        guid: Some(candidate.url.clone()),
        link: candidate.url,
        published: candidate.published,
        raw_date: candidate.published_raw,
        snippet: candidate
            .snippet
            .map(|s| truncate_chars(&strip_tags(&s), SNIPPET_MAX_CHARS)),
        content: None,
        author: candidate.author,
        image_url: candidate.image_url.filter(|u| u.starts_with("https://")),
    })
}

/// Scrape a listing page into parsed items. The top candidates get their
/// pages fetched with a small bounded fan-out before conversion.
pub async fn scrape_listing(
    client: &reqwest::Client,
    page_url: &str,
    html: &str,
    kind: ScraperKind,
) -> Vec<ParsedItem> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let mut candidates = discover_candidates(html, &base, kind);
    debug!(url = %page_url, candidates = candidates.len(), "Listing candidates discovered");

    let top_urls: Vec<String> = candidates
        .iter()
        .take(META_FETCH_LIMIT)
        .map(|c| c.url.clone())
        .collect();

    let metas: HashMap<String, PageMeta> = stream::iter(top_urls)
        .map(|url| async move {
            let meta = fetch_page_meta(client, &url).await;
            (url, meta)
        })
        .buffer_unordered(META_FETCH_CONCURRENCY)
        .filter_map(|(url, meta)| async move { meta.map(|m| (url, m)) })
        .collect()
        .await;

    for candidate in candidates.iter_mut().take(META_FETCH_LIMIT) {
        if let Some(meta) = metas.get(&candidate.url).cloned() {
            apply_meta(candidate, meta);
        }
    }

    candidates
        .into_iter()
        .filter_map(candidate_to_item)
        .collect()
}
