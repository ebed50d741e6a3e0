//! Ingestion scheduler (C1) and the per-feed pipeline:
//! fetch → parse/scrape → enrich → classify → upsert → summarize/mirror.
//!
//! Feeds run through a bounded fan-out; one failing origin is recorded in
//! its own metrics row and never aborts the cycle.

use crate::ai::AiClient;
use crate::db::{Db, NewItem};
use crate::media::{self, MediaStore};
use crate::summarizer;
use bluegrass_core::canonical::{canonicalize_url, item_id_from_url};
use bluegrass_core::classify;
use bluegrass_core::config::{AppConfig, ARTICLE_TIMEOUT, LISTING_TIMEOUT};
use bluegrass_core::extract;
use bluegrass_core::models::{
    Feed, FetchMode, ItemLocation, ParsedItem, RegionScope, RunSummary, ScraperKind,
};
use bluegrass_core::parser;
use bluegrass_core::scrape;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use url::Url;

const ARTICLE_READ_CAP_BYTES: usize = 2_000_000;
const CLEANUP_INTERVAL_SECS: u64 = 86_400;

pub struct IngestCtx {
    pub db: Arc<Db>,
    pub client: reqwest::Client,
    pub ai: AiClient,
    pub store: Arc<MediaStore>,
    pub cfg: AppConfig,
}

enum ListingFetch {
    NotModified,
    Fetched {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

struct FeedOutcome {
    feed_id: String,
    items_seen: u32,
    items_upserted: u32,
    updated: bool,
    error: Option<String>,
    duration_ms: i64,
}

/// Background loop: ingestion on the configured interval, retention sweeps
/// daily.
pub async fn run(ctx: Arc<IngestCtx>) {
    let mut fetch_interval = tokio::time::interval(std::time::Duration::from_secs(
        ctx.cfg.ingest_interval_seconds,
    ));
    let mut cleanup_interval =
        tokio::time::interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
    cleanup_interval.tick().await;

    loop {
        tokio::select! {
            _ = fetch_interval.tick() => {
                run_cycle(&ctx).await;
            }
            _ = cleanup_interval.tick() => {
                match ctx.db.cleanup_expired_kv() {
                    Ok(n) if n > 0 => info!(deleted = n, "Expired cache keys swept"),
                    Err(e) => warn!(error = %e, "Failed to sweep cache keys"),
                    _ => {}
                }
                match ctx.db.cleanup_expired_error_events() {
                    Ok(n) if n > 0 => info!(deleted = n, "Expired error events swept"),
                    Err(e) => warn!(error = %e, "Failed to sweep error events"),
                    _ => {}
                }
            }
        }
    }
}

/// One ingestion cycle over every enabled feed. The run summary row is
/// written once, at the end, with per-feed metrics alongside.
pub async fn run_cycle(ctx: &IngestCtx) -> RunSummary {
    let started_at = Utc::now();
    let feeds = match ctx.db.get_enabled_feeds() {
        Ok(feeds) => feeds,
        Err(e) => {
            warn!(error = %e, "Failed to load feeds for ingest cycle");
            return RunSummary::default();
        }
    };
    if feeds.is_empty() {
        return RunSummary::default();
    }

    let outcomes: Vec<FeedOutcome> = stream::iter(feeds)
        .map(|feed| process_feed(ctx, feed))
        .buffer_unordered(ctx.cfg.ingest_concurrency)
        .collect()
        .await;

    let mut summary = RunSummary::default();
    for outcome in &outcomes {
        summary.feeds_processed += 1;
        if outcome.updated {
            summary.feeds_updated += 1;
        }
        summary.items_seen += outcome.items_seen;
        summary.items_upserted += outcome.items_upserted;
        if outcome.error.is_some() {
            summary.errors += 1;
        }
    }

    let finished_at = Utc::now();
    match ctx.db.insert_fetch_run(
        &summary,
        &started_at.to_rfc3339(),
        &finished_at.to_rfc3339(),
    ) {
        Ok(run_id) => {
            for outcome in &outcomes {
                let _ = ctx.db.insert_feed_run_metric(
                    run_id,
                    &outcome.feed_id,
                    outcome.items_seen,
                    outcome.items_upserted,
                    outcome.error.as_deref(),
                    outcome.duration_ms,
                );
            }
        }
        Err(e) => warn!(error = %e, "Failed to record fetch run"),
    }

    info!(
        feeds_processed = summary.feeds_processed,
        feeds_updated = summary.feeds_updated,
        items_seen = summary.items_seen,
        items_upserted = summary.items_upserted,
        errors = summary.errors,
        "Ingest cycle complete"
    );
    summary
}

async fn process_feed(ctx: &IngestCtx, feed: Feed) -> FeedOutcome {
    let start = Instant::now();
    let mut outcome = FeedOutcome {
        feed_id: feed.id.clone(),
        items_seen: 0,
        items_upserted: 0,
        updated: false,
        error: None,
        duration_ms: 0,
    };

    match fetch_listing(&ctx.client, &feed).await {
        Ok(ListingFetch::NotModified) => {
            let _ = ctx.db.update_feed_validators(&feed.id, None, None);
        }
        Ok(ListingFetch::Fetched {
            body,
            etag,
            last_modified,
        }) => {
            let _ = ctx.db.update_feed_validators(
                &feed.id,
                etag.as_deref(),
                last_modified.as_deref(),
            );

            let parsed = match feed.fetch_mode {
                FetchMode::Rss => match parser::parse_feed(&body) {
                    Ok(items) => items,
                    Err(e) => {
                        outcome.error = Some(format!("parse_error: {e}"));
                        let _ = ctx.db.insert_error_event(
                            "ingest",
                            &format!("{}: {e}", feed.id),
                            ctx.cfg.error_event_ttl_days,
                        );
                        outcome.duration_ms = start.elapsed().as_millis() as i64;
                        return outcome;
                    }
                },
                FetchMode::Scrape => {
                    let kind = feed.scraper_id.unwrap_or_else(|| {
                        Url::parse(&feed.url)
                            .ok()
                            .and_then(|u| u.host_str().map(ScraperKind::for_host))
                            .unwrap_or(ScraperKind::GenericNews)
                    });
                    let html = String::from_utf8_lossy(&body).into_owned();
                    scrape::scrape_listing(&ctx.client, &feed.url, &html, kind).await
                }
            };

            outcome.updated = true;
            for item in parsed {
                outcome.items_seen += 1;
                match ingest_item(ctx, &feed, item).await {
                    Ok(true) => outcome.items_upserted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(feed_id = %feed.id, error = %e, "Item ingest failed");
                        let _ = ctx.db.insert_error_event(
                            "ingest",
                            &format!("{}: {e}", feed.id),
                            ctx.cfg.error_event_ttl_days,
                        );
                    }
                }
            }
        }
        Err(e) => {
            warn!(feed_id = %feed.id, error = %e, "Feed fetch failed");
            outcome.error = Some(format!("fetch_error: {e}"));
            let _ = ctx.db.insert_error_event(
                "ingest",
                &format!("{}: {e}", feed.id),
                ctx.cfg.error_event_ttl_days,
            );
        }
    }

    outcome.duration_ms = start.elapsed().as_millis() as i64;
    outcome
}

/// Conditional GET against the listing URL; stored validators short-circuit
/// unchanged feeds to a 304 no-op.
async fn fetch_listing(client: &reqwest::Client, feed: &Feed) -> Result<ListingFetch, String> {
    let mut request = client.get(&feed.url).timeout(LISTING_TIMEOUT);
    if let Some(etag) = &feed.etag {
        request = request.header(IF_NONE_MATCH, etag);
    }
    if let Some(last_modified) = &feed.last_modified {
        request = request.header(IF_MODIFIED_SINCE, last_modified);
    }

    let response = request.send().await.map_err(|e| e.to_string())?;
    if response.status() == StatusCode::NOT_MODIFIED {
        return Ok(ListingFetch::NotModified);
    }
    if !response.status().is_success() {
        return Err(format!("status {}", response.status()));
    }

    let etag = response
        .headers()
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let last_modified = response
        .headers()
        .get("last-modified")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();

    Ok(ListingFetch::Fetched {
        body,
        etag,
        last_modified,
    })
}

struct ArticlePage {
    status: u16,
    text: Option<String>,
    meta: extract::PageMeta,
}

/// Fetch the article body for items the listing left thin (C3).
async fn fetch_article(client: &reqwest::Client, url: &str) -> Option<ArticlePage> {
    let response = match client.get(url).timeout(ARTICLE_TIMEOUT).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %url, error = %e, "Article fetch failed");
            return None;
        }
    };
    let status = response.status().as_u16();
    if !response.status().is_success() {
        return Some(ArticlePage {
            status,
            text: None,
            meta: extract::PageMeta::default(),
        });
    }
    let is_html = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
        .unwrap_or(true);
    if !is_html {
        return Some(ArticlePage {
            status,
            text: None,
            meta: extract::PageMeta::default(),
        });
    }

    let bytes = response.bytes().await.ok()?;
    let html = String::from_utf8_lossy(&bytes[..bytes.len().min(ARTICLE_READ_CAP_BYTES)]);
    Some(ArticlePage {
        status,
        text: extract::extract_article_text(&html),
        meta: extract::extract_meta(&html),
    })
}

/// Run one parsed item through enrich → classify → upsert, then trigger the
/// post-upsert enrichers (summary, media mirror).
async fn ingest_item(ctx: &IngestCtx, feed: &Feed, item: ParsedItem) -> Result<bool, String> {
    let canonical = canonicalize_url(&item.link)
        .ok_or_else(|| format!("unusable link: {}", item.link))?;
    let item_id = item_id_from_url(&canonical);

    let mut content = item.content;
    let mut image_url = item.image_url;
    let mut author = item.author;
    let mut published = item.published;
    let mut article_checked_at = None;
    let mut article_status = None;

    if content.is_none() {
        if let Some(page) = fetch_article(&ctx.client, &canonical).await {
            article_checked_at = Some(Utc::now().to_rfc3339());
            article_status = Some(page.status);
            content = page.text;
            image_url = image_url.or(page.meta.image_url);
            author = author.or(page.meta.author);
            published = published.or(page.meta.published);
        }
    }

    let body_text = content
        .as_deref()
        .or(item.snippet.as_deref())
        .unwrap_or_default();
    let classification = classify::classify(&item.title, body_text);

    let content_hash = content
        .as_deref()
        .map(|text| hex::encode(Sha256::digest(text.as_bytes())));

    let new_item = NewItem {
        id: item_id.clone(),
        title: item.title.clone(),
        url: canonical.clone(),
        author,
        region_scope: classification.region_scope,
        published_at: published.map(|d| d.to_rfc3339()),
        content: content.clone(),
        image_url: image_url.clone(),
        fetched_at: Utc::now().to_rfc3339(),
        content_hash,
        article_checked_at,
        article_status,
    };
    let inserted = ctx.db.upsert_item(&new_item)?;
    ctx.db.link_feed_item(&feed.id, &item_id)?;

    let mut locations = classification.locations.clone();
    if classification.region_scope == RegionScope::Ky {
        if locations.is_empty() {
            if let Some(county) = &feed.county {
                locations.push(ItemLocation::county(&feed.state, county));
            }
        }
        locations.push(ItemLocation::statewide(&feed.state));
    }
    if !locations.is_empty() {
        ctx.db.replace_item_locations(&item_id, &locations)?;
    }

    if let Some(text) = &content {
        if let Err(e) = summarizer::summarize_item(
            &ctx.db,
            &ctx.ai,
            &ctx.cfg,
            &item_id,
            &item.title,
            &canonical,
            text,
        )
        .await
        {
            warn!(item_id = %item_id, error = %e, "Summarization failed");
        }
    }

    if let Some(source) = &image_url {
        if let Err(e) =
            media::mirror_image(&ctx.db, &ctx.store, &ctx.client, &item_id, source).await
        {
            warn!(item_id = %item_id, error = %e, "Media mirror failed");
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scraper_kind_falls_back_to_host_map() {
        let feed = Feed {
            id: "cj".into(),
            name: "Courier Journal".into(),
            category: "news".into(),
            url: "https://www.courier-journal.com/news/".into(),
            state: "KY".into(),
            county: Some("Jefferson".into()),
            region_scope: RegionScope::Ky,
            fetch_mode: FetchMode::Scrape,
            scraper_id: None,
            enabled: true,
            etag: None,
            last_modified: None,
            last_checked: None,
        };
        let kind = feed.scraper_id.unwrap_or_else(|| {
            Url::parse(&feed.url)
                .ok()
                .and_then(|u| u.host_str().map(ScraperKind::for_host))
                .unwrap_or(ScraperKind::GenericNews)
        });
        assert_eq!(kind, ScraperKind::GannettStory);
    }
}
