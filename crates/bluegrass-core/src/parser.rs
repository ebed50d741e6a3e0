//! RSS/Atom normalization.
//!
//! feed-rs is the permissive parse layer; everything downstream sees only
//! the uniform `ParsedItem` record. Dates that fail to parse stay None so
//! ingest never invents a publication time.

use crate::error::{AppError, Result};
use crate::extract::{first_img_src, strip_tags, truncate_chars};
use crate::models::ParsedItem;
use feed_rs::model::Entry;

pub const SNIPPET_MAX_CHARS: usize = 2_000;
pub const CONTENT_MAX_CHARS: usize = 50_000;

/// Parse an RSS 2.0 or Atom document into parsed items, in document order.
pub fn parse_feed(body: &[u8]) -> Result<Vec<ParsedItem>> {
    let feed = feed_rs::parser::parse(body).map_err(|e| AppError::Parse(e.to_string()))?;
    Ok(feed.entries.iter().filter_map(entry_to_item).collect())
}

fn entry_to_item(entry: &Entry) -> Option<ParsedItem> {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())?;

    let title = entry
        .title
        .as_ref()
        .map(|t| strip_tags(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "(no title)".into());

    let published = entry.published.or(entry.updated);

    let summary_html = entry.summary.as_ref().map(|s| s.content.clone());
    let content_html = entry.content.as_ref().and_then(|c| c.body.clone());

    let snippet = summary_html
        .as_deref()
        .map(strip_tags)
        .filter(|s| !s.is_empty())
        .map(|s| truncate_chars(&s, SNIPPET_MAX_CHARS));

    let content = content_html
        .as_deref()
        .map(strip_tags)
        .filter(|s| !s.is_empty())
        .map(|s| truncate_chars(&s, CONTENT_MAX_CHARS));

    let image_url = pick_image(entry, content_html.as_deref(), summary_html.as_deref());

    let author = entry
        .authors
        .first()
        .map(|p| p.name.trim().to_string())
        .filter(|a| !a.is_empty());

    Some(ParsedItem {
        title,
        link,
        guid: Some(entry.id.clone()),
        published,
        raw_date: published.map(|d| d.to_rfc3339()),
        snippet,
        content,
        author,
        image_url,
    })
}

/// Image priority: enclosure/media content, media thumbnail, then the first
/// inline `<img>` of the content or summary HTML. feed-rs folds enclosures,
/// MediaRSS, and itunes artwork into `entry.media`.
fn pick_image(
    entry: &Entry,
    content_html: Option<&str>,
    summary_html: Option<&str>,
) -> Option<String> {
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                let looks_like_image = content
                    .content_type
                    .as_ref()
                    .map(|m| m.essence().ty == "image")
                    .unwrap_or(true);
                if looks_like_image {
                    return Some(url.to_string());
                }
            }
        }
        if let Some(thumb) = media.thumbnails.first() {
            return Some(thumb.image.uri.clone());
        }
    }

    if let Some(content) = &entry.content {
        if let Some(src) = &content.src {
            if content.content_type.essence().ty == "image" {
                return Some(src.href.clone());
            }
        }
    }

    content_html
        .and_then(first_img_src)
        .or_else(|| summary_html.and_then(first_img_src))
}
