//! HTML metadata and readable-text extraction.
//!
//! Everything here is regex-based on purpose: article pages are fetched in
//! bulk and we only need a handful of head tags plus a rough main-content
//! region, not a full DOM.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Metadata pulled from a single article page.
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub canonical_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_raw: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub image_url: Option<String>,
}

macro_rules! cached_re {
    ($pattern:expr) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new($pattern).unwrap())
    }};
}

/// Find `<meta {attr}="{name}" content="...">` in either attribute order.
pub fn meta_content(html: &str, attr: &str, name: &str) -> Option<String> {
    let patterns = [
        format!(
            r#"(?is)<meta[^>]+{attr}\s*=\s*["']{name}["'][^>]*content\s*=\s*["']([^"']+)["']"#,
            attr = regex::escape(attr),
            name = regex::escape(name),
        ),
        format!(
            r#"(?is)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]*{attr}\s*=\s*["']{name}["']"#,
            attr = regex::escape(attr),
            name = regex::escape(name),
        ),
    ];
    for pattern in &patterns {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(html) {
                let value = decode_entities(caps.get(1)?.as_str()).trim().to_string();
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn first_of<'a>(
    html: &str,
    keys: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Option<String> {
    keys.into_iter()
        .find_map(|(attr, name)| meta_content(html, attr, name))
}

/// Document `<title>` text.
fn title_tag(html: &str) -> Option<String> {
    let re = cached_re!(r"(?is)<title[^>]*>(.*?)</title>");
    let caps = re.captures(html)?;
    let title = decode_entities(&strip_all_tags(caps.get(1)?.as_str()));
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn time_datetime_attr(html: &str) -> Option<String> {
    let re = cached_re!(r#"(?is)<time[^>]+datetime\s*=\s*["']([^"']+)["']"#);
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn canonical_link(html: &str) -> Option<String> {
    let patterns = [
        r#"(?is)<link[^>]+rel\s*=\s*["']canonical["'][^>]*href\s*=\s*["']([^"']+)["']"#,
        r#"(?is)<link[^>]+href\s*=\s*["']([^"']+)["'][^>]*rel\s*=\s*["']canonical["']"#,
    ];
    for pattern in &patterns {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(html) {
                return caps.get(1).map(|m| m.as_str().trim().to_string());
            }
        }
    }
    None
}

/// Extract page metadata via the fixed tag priority order.
pub fn extract_meta(html: &str) -> PageMeta {
    let title = first_of(html, [("property", "og:title"), ("name", "twitter:title")])
        .or_else(|| title_tag(html));

    let description = first_of(
        html,
        [("property", "og:description"), ("name", "description")],
    );

    let published_raw = first_of(
        html,
        [
            ("property", "article:published_time"),
            ("name", "parsely-pub-date"),
            ("itemprop", "datePublished"),
        ],
    )
    .or_else(|| time_datetime_attr(html));
    let published = published_raw.as_deref().and_then(parse_date);

    let author = first_of(html, [("name", "author"), ("property", "article:author")]);

    // Hero images must be https; protocol-relative and http sources are dropped.
    let image_url = first_of(
        html,
        [("property", "og:image"), ("name", "twitter:image")],
    )
    .filter(|u| u.starts_with("https://"));

    let canonical_url = canonical_link(html).or_else(|| meta_content(html, "property", "og:url"));

    PageMeta {
        canonical_url,
        title,
        description,
        published_raw,
        published,
        author,
        image_url,
    }
}

/// Coerce the date formats seen in the wild to UTC. Unparseable input is
/// None, never the current time.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Remove markup and collapse whitespace, leaving readable text.
pub fn strip_tags(html: &str) -> String {
    let no_script = cached_re!(r"(?is)<script[^>]*>.*?</script>").replace_all(html, " ");
    let no_style = cached_re!(r"(?is)<style[^>]*>.*?</style>").replace_all(&no_script, " ");
    let text = strip_all_tags(&no_style);
    collapse_whitespace(&decode_entities(&text))
}

fn strip_all_tags(html: &str) -> String {
    cached_re!(r"<[^>]+>").replace_all(html, " ").into_owned()
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to a character budget on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// First `<img src>` in an HTML fragment, https only.
pub fn first_img_src(html: &str) -> Option<String> {
    let re = cached_re!(r#"(?is)<img[^>]+src\s*=\s*["']([^"']+)["']"#);
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|u| u.starts_with("https://"))
}

const NAV_TERMS: &[&str] = &[
    "subscribe",
    "sign up",
    "newsletter",
    "advertisement",
    "cookie",
    "privacy policy",
    "terms of use",
    "all rights reserved",
    "related stories",
    "trending",
    "read more",
];

const MIN_REGION_TEXT_CHARS: usize = 220;
const EXCERPT_MAX_CHARS: usize = 10_000;

fn region_patterns() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?is)<article[^>]*>(.*?)</article>",
            r"(?is)<main[^>]*>(.*?)</main>",
            r#"(?is)<section[^>]*class\s*=\s*["'][^"']*(?:story-body|article-body|entry-content|post-content|article-content|story)[^"']*["'][^>]*>(.*?)</section>"#,
            r#"(?is)<div[^>]*class\s*=\s*["'][^"']*(?:story-body|article-body|entry-content|post-content|article-content|story)[^"']*["'][^>]*>(.*?)</div>"#,
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
    .as_slice()
}

fn score_region(region_html: &str) -> (i64, String) {
    let text = strip_tags(region_html);
    let paragraphs = cached_re!(r"(?i)<p[\s>]").find_iter(region_html).count() as i64;
    let lower = text.to_lowercase();
    let nav_hits: i64 = NAV_TERMS
        .iter()
        .map(|t| lower.matches(t).count() as i64)
        .sum();
    let score = text.len() as i64 + 50 * paragraphs - 150 * nav_hits;
    (score, text)
}

/// Extract the readable article body, capped at the excerpt budget.
///
/// Candidate regions are scored by text volume and paragraph density with a
/// penalty for boilerplate terms; when nothing scores, the whole body minus
/// nav/footer/aside chrome is used instead.
pub fn extract_article_text(html: &str) -> Option<String> {
    let mut best: Option<(i64, String)> = None;
    for re in region_patterns() {
        for caps in re.captures_iter(html) {
            if let Some(inner) = caps.get(1) {
                let (score, text) = score_region(inner.as_str());
                if best.as_ref().map_or(true, |(b, _)| score > *b) {
                    best = Some((score, text));
                }
            }
        }
    }

    let text = match best {
        Some((score, text)) if score > 0 && text.chars().count() >= MIN_REGION_TEXT_CHARS => text,
        _ => body_without_chrome(html)?,
    };

    let text = truncate_chars(&text, EXCERPT_MAX_CHARS);
    (!text.trim().is_empty()).then(|| text.trim().to_string())
}

fn body_without_chrome(html: &str) -> Option<String> {
    let body = cached_re!(r"(?is)<body[^>]*>(.*?)</body>")
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| html.to_string());

    let mut cleaned = body;
    for pattern in [
        r"(?is)<nav[^>]*>.*?</nav>",
        r"(?is)<footer[^>]*>.*?</footer>",
        r"(?is)<aside[^>]*>.*?</aside>",
        r"(?is)<header[^>]*>.*?</header>",
        r"(?is)<form[^>]*>.*?</form>",
    ] {
        if let Ok(re) = Regex::new(pattern) {
            cleaned = re.replace_all(&cleaned, " ").into_owned();
        }
    }
    let text = strip_tags(&cleaned);
    (!text.trim().is_empty()).then(|| text)
}

/// Strip executable content before re-serving third-party HTML through the
/// open proxy: scripts, embedded frames, inline handlers, javascript: URLs.
pub fn sanitize_proxy_html(html: &str) -> String {
    let mut cleaned = cached_re!(r"(?is)<script[^>]*>.*?</script>")
        .replace_all(html, "")
        .into_owned();
    for pattern in [
        r"(?is)<script[^>]*/?>",
        r"(?is)<iframe[^>]*>.*?</iframe>",
        r"(?is)<object[^>]*>.*?</object>",
        r"(?is)<embed[^>]*/?>",
        r#"(?is)\son\w+\s*=\s*"[^"]*""#,
        r#"(?is)\son\w+\s*=\s*'[^']*'"#,
        r"(?is)\son\w+\s*=\s*[^\s>]+",
    ] {
        if let Ok(re) = Regex::new(pattern) {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
    }
    cleaned
        .replace("javascript:", "")
        .replace("JAVASCRIPT:", "")
}
