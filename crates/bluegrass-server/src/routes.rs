use crate::cache::{cached_json, CachePolicy, DEFAULT_STALE_SECS};
use crate::db::{decode_cursor, Db, ItemFilter, ListScope, SearchSpec, SortOrder};
use crate::fetcher::{self, IngestCtx};
use crate::guard::{bot_gate, check_rate_limit, client_ip, RateBucket, RateDecision};
use crate::media::MediaStore;
use crate::summarizer;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bluegrass_core::canonical::is_private_host;
use bluegrass_core::classify;
use bluegrass_core::config::{AppConfig, LISTING_TIMEOUT};
use bluegrass_core::error::AppError;
use bluegrass_core::extract::sanitize_proxy_html;
use bluegrass_core::feeds::SeedFeed;
use bluegrass_core::models::{ItemsResponse, ReviewStatus};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

pub const MAX_HOURS: i64 = 24 * 365;
const MAX_QUERY_CHARS: usize = 200;
const MEDIA_CACHE_CONTROL: &str = "public, max-age=2592000, immutable";

pub struct AppState {
    pub db: Arc<Db>,
    pub http_client: reqwest::Client,
    pub media: Arc<MediaStore>,
    pub cfg: AppConfig,
    pub ingest: Arc<IngestCtx>,
}

// --- shared helpers ---

fn error_body(err: &AppError) -> serde_json::Value {
    serde_json::json!({
        "error": err.to_string(),
        "code": err.code(),
        "status": err.status(),
    })
}

/// Render an error through its stable `{error, code, status}` contract.
fn error_response(err: AppError) -> Response {
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error_body(&err))).into_response()
}

fn bad_request(message: &str) -> Response {
    error_response(AppError::BadRequest(message.into()))
}

fn internal_error(message: String) -> Response {
    tracing::error!(error = %message, "Request failed");
    error_response(AppError::Db("request failed".into()))
}

fn rate_limited(decision: RateDecision) -> Response {
    let err = AppError::TooManyRequests;
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("x-ratelimit-remaining", decision.remaining.to_string()),
            ("x-ratelimit-reset-sec", decision.reset_secs.to_string()),
        ],
        Json(error_body(&err)),
    )
        .into_response()
}

/// Gate shared by every handler: count the request against its bucket and,
/// for guarded surfaces, run the bot check.
fn gate(
    state: &AppState,
    headers: &HeaderMap,
    bucket: RateBucket,
    guarded: bool,
) -> Result<(), Response> {
    if guarded {
        if let Some(reason) = bot_gate(headers, state.cfg.bot_score_min) {
            return Err(error_response(AppError::Forbidden(reason.into())));
        }
    }
    let limit = match bucket {
        RateBucket::Read => state.cfg.rate_limit_read_per_min,
        RateBucket::Write => state.cfg.rate_limit_write_per_min,
        RateBucket::Admin => state.cfg.rate_limit_admin_per_min,
    };
    let decision = check_rate_limit(&state.db, bucket, &client_ip(headers), limit);
    if !decision.allowed {
        return Err(rate_limited(decision));
    }
    Ok(())
}

/// Admin identity from the bearer token or the access-proxy email header.
/// With neither a token nor an allowlist configured the instance is open
/// (dev mode).
fn admin_identity(headers: &HeaderMap, cfg: &AppConfig) -> Option<String> {
    if !cfg.admin_token.is_empty() {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let token = headers.get("x-admin-token").and_then(|v| v.to_str().ok());
        if bearer == Some(cfg.admin_token.as_str()) || token == Some(cfg.admin_token.as_str()) {
            return Some("token".into());
        }
    }
    if let Some(email) = headers
        .get("cf-access-authenticated-user-email")
        .and_then(|v| v.to_str().ok())
    {
        if cfg.is_admin_email(email) {
            return Some(email.to_string());
        }
    }
    if cfg.admin_token.is_empty() && cfg.admin_emails.is_empty() && cfg.editor_emails.is_empty() {
        return Some("open".into());
    }
    None
}

fn require_admin(headers: &HeaderMap, cfg: &AppConfig) -> Result<String, Response> {
    admin_identity(headers, cfg)
        .ok_or_else(|| error_response(AppError::Unauthorized))
}

fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.unwrap_or("").as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn all<'a>(pairs: &'a [(String, String)], key: &str) -> impl Iterator<Item = &'a str> + 'a {
    let key = key.to_string();
    pairs
        .iter()
        .filter(move |(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
}

/// Build the common listing filter; range violations are 400s.
fn filter_from_pairs(
    pairs: &[(String, String)],
    include_drafts: bool,
) -> Result<ItemFilter, Response> {
    let scope = match first(pairs, "scope") {
        None => ListScope::Ky,
        Some(raw) => {
            ListScope::from_str(raw).ok_or_else(|| bad_request("scope must be ky, national, or all"))?
        }
    };

    let hours = match first(pairs, "hours") {
        None => 2,
        Some(raw) => {
            let hours: i64 = raw.parse().map_err(|_| bad_request("hours must be an integer"))?;
            if !(1..=MAX_HOURS).contains(&hours) {
                return Err(bad_request("hours out of range"));
            }
            hours
        }
    };

    let limit = match first(pairs, "limit") {
        None => 30,
        Some(raw) => {
            let limit: i64 = raw.parse().map_err(|_| bad_request("limit must be an integer"))?;
            if !(1..=100).contains(&limit) {
                return Err(bad_request("limit out of range"));
            }
            limit
        }
    };

    let state = match first(pairs, "state") {
        None => None,
        Some(raw) => {
            if raw.len() != 2 || !raw.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(bad_request("state must be a two-letter code"));
            }
            Some(raw.to_uppercase())
        }
    };

    let mut counties: Vec<String> = all(pairs, "county")
        .chain(all(pairs, "counties[]"))
        .chain(all(pairs, "counties"))
        .map(str::to_string)
        .filter(|c| !c.is_empty())
        .collect();
    counties.sort();
    counties.dedup();

    let cursor = match first(pairs, "cursor") {
        None => None,
        Some(raw) => Some(decode_cursor(raw).ok_or_else(|| bad_request("malformed cursor"))?),
    };

    Ok(ItemFilter {
        scope,
        feed_id: first(pairs, "feedId").map(str::to_string),
        category: first(pairs, "category").map(str::to_string),
        state,
        counties,
        hours,
        cursor,
        limit,
        include_drafts,
    })
}

// --- public read path ---

pub async fn get_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Read, false) {
        return resp;
    }
    let pairs = parse_query(raw.as_deref());
    let include_drafts = admin_identity(&headers, &state.cfg).is_some();
    let filter = match filter_from_pairs(&pairs, include_drafts) {
        Ok(filter) => filter,
        Err(resp) => return resp,
    };

    let policy = CachePolicy {
        ttl: state.cfg.api_cache_ttl_seconds as i64,
        stale: DEFAULT_STALE_SECS,
    };
    cached_json(&state.db, policy, "/api/items", &pairs, &headers, || {
        let (items, next_cursor) = state
            .db
            .query_items(&filter, None)
            .map_err(internal_error)?;
        serde_json::to_value(ItemsResponse { items, next_cursor })
            .map_err(|e| internal_error(e.to_string()))
    })
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Read, false) {
        return resp;
    }
    let policy = CachePolicy {
        ttl: state.cfg.api_cache_ttl_seconds as i64,
        stale: DEFAULT_STALE_SECS,
    };
    let path = format!("/api/items/{id}");
    cached_json(&state.db, policy, &path, &[], &headers, || {
        match state.db.get_item(&id).map_err(internal_error)? {
            Some(mut item) => {
                if item.summary.is_none() {
                    item.summary = summarizer::get_cached_summary(&state.db, &id);
                }
                serde_json::to_value(serde_json::json!({ "item": item }))
                    .map_err(|e| internal_error(e.to_string()))
            }
            None => Err(error_response(AppError::NotFound("item".into()))),
        }
    })
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Read, false) {
        return resp;
    }
    let pairs = parse_query(raw.as_deref());

    let q = match first(&pairs, "q").map(str::trim) {
        Some(q) if !q.is_empty() && q.chars().count() <= MAX_QUERY_CHARS => q.to_string(),
        _ => return bad_request("q must be 1-200 characters"),
    };
    let order = match first(&pairs, "sort") {
        None | Some("newest") => SortOrder::Newest,
        Some("oldest") => SortOrder::Oldest,
        Some(_) => return bad_request("sort must be newest or oldest"),
    };
    let include_drafts = admin_identity(&headers, &state.cfg).is_some();
    let filter = match filter_from_pairs(&pairs, include_drafts) {
        Ok(filter) => filter,
        Err(resp) => return resp,
    };

    let spec = SearchSpec {
        tokens: q.split_whitespace().map(str::to_string).collect(),
        counties: classify::counties_named(&q),
        order,
    };

    let policy = CachePolicy {
        ttl: state.cfg.api_cache_ttl_seconds as i64,
        stale: DEFAULT_STALE_SECS,
    };
    cached_json(&state.db, policy, "/api/search", &pairs, &headers, || {
        let (items, next_cursor) = state
            .db
            .query_items(&filter, Some(&spec))
            .map_err(internal_error)?;
        serde_json::to_value(ItemsResponse { items, next_cursor })
            .map_err(|e| internal_error(e.to_string()))
    })
}

pub async fn get_feeds(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Read, false) {
        return resp;
    }
    let pairs = parse_query(raw.as_deref());
    let scope = match first(&pairs, "scope") {
        None => ListScope::All,
        Some(raw) => match ListScope::from_str(raw) {
            Some(scope) => scope,
            None => return bad_request("scope must be ky, national, or all"),
        },
    };

    let policy = CachePolicy {
        ttl: (state.cfg.api_cache_ttl_seconds as i64).max(120),
        stale: DEFAULT_STALE_SECS,
    };
    cached_json(&state.db, policy, "/api/feeds", &pairs, &headers, || {
        let feeds = state.db.get_feeds(scope).map_err(internal_error)?;
        serde_json::to_value(serde_json::json!({ "feeds": feeds }))
            .map_err(|e| internal_error(e.to_string()))
    })
}

pub async fn get_counties(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Read, false) {
        return resp;
    }
    let pairs = parse_query(raw.as_deref());
    let req_state = first(&pairs, "state").unwrap_or("KY").to_uppercase();
    if req_state.len() != 2 {
        return bad_request("state must be a two-letter code");
    }
    let hours = match first(&pairs, "hours") {
        None => 24,
        Some(raw) => match raw.parse::<i64>() {
            Ok(h) if (1..=MAX_HOURS).contains(&h) => h,
            _ => return bad_request("hours out of range"),
        },
    };

    let policy = CachePolicy {
        ttl: (state.cfg.api_cache_ttl_seconds as i64).max(120),
        stale: DEFAULT_STALE_SECS,
    };
    cached_json(&state.db, policy, "/api/counties", &pairs, &headers, || {
        let counts = state
            .db
            .county_counts(&req_state, hours)
            .map_err(internal_error)?;
        let counties: Vec<serde_json::Value> = counts
            .into_iter()
            .map(|(county, count)| serde_json::json!({"county": county, "count": count}))
            .collect();
        Ok(serde_json::json!({
            "state": req_state,
            "hours": hours,
            "counties": counties,
        }))
    })
}

// --- media serving ---

fn media_etag(key: &str, updated_at: &str) -> String {
    let digest = hex::encode(Sha256::digest(format!("{key}:{updated_at}").as_bytes()));
    format!("\"{}\"", &digest[..16])
}

/// Item id encoded in an object key: `news/<item_id>.<ext>`.
fn item_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix("news/")?.rsplit_once('.').map(|(id, _)| id)
}

pub async fn serve_media(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Read, false) {
        return resp;
    }

    match state.db.get_media_by_key(&key) {
        Ok(Some(media)) => {
            let etag = media_etag(&media.object_key, &media.updated_at);
            if headers
                .get(header::IF_NONE_MATCH)
                .and_then(|v| v.to_str().ok())
                == Some(etag.as_str())
            {
                return (
                    StatusCode::NOT_MODIFIED,
                    [
                        (header::ETAG, etag),
                        (header::CACHE_CONTROL, MEDIA_CACHE_CONTROL.into()),
                    ],
                )
                    .into_response();
            }
            match state.media.read(&media.object_key).await {
                Some(bytes) => (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, media.content_type.clone()),
                        (header::ETAG, etag),
                        (header::CACHE_CONTROL, MEDIA_CACHE_CONTROL.into()),
                    ],
                    bytes,
                )
                    .into_response(),
                None => error_response(AppError::NotFound("media object".into())),
            }
        }
        Ok(None) => {
            // A stale key still names the item; point at its current object.
            if let Some(item_id) = item_id_from_key(&key) {
                if let Ok(Some(current)) = state.db.get_media(item_id) {
                    return (
                        StatusCode::FOUND,
                        [(
                            header::LOCATION,
                            format!("/api/media/{}", current.object_key),
                        )],
                    )
                        .into_response();
                }
            }
            error_response(AppError::NotFound("media".into()))
        }
        Err(e) => internal_error(e),
    }
}

// --- open proxy ---

fn frame_document(page_url: &str, sanitized: &str) -> String {
    let base = format!("<base href=\"{}\">", page_url.replace('"', "%22"));
    if let Some(idx) = sanitized.to_lowercase().find("<head") {
        if let Some(end) = sanitized[idx..].find('>') {
            let insert_at = idx + end + 1;
            return format!(
                "{}{}{}",
                &sanitized[..insert_at],
                base,
                &sanitized[insert_at..]
            );
        }
    }
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">{base}</head><body>{sanitized}</body></html>"
    )
}

pub async fn open_proxy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Read, true) {
        return resp;
    }
    let pairs = parse_query(raw.as_deref());
    let raw_url = match first(&pairs, "url") {
        Some(u) if !u.is_empty() => u,
        _ => return bad_request("url parameter is required"),
    };

    let parsed = match Url::parse(raw_url) {
        Ok(u) if u.scheme() == "https" => u,
        _ => return bad_request("url must be absolute https"),
    };
    if is_private_host(&parsed) {
        return error_response(AppError::Forbidden("host not allowed".into()));
    }

    let response = match state
        .http_client
        .get(parsed.as_str())
        .timeout(LISTING_TIMEOUT)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %parsed, error = %e, "Proxy fetch failed");
            return error_response(AppError::Fetch(e));
        }
    };
    if !response.status().is_success() {
        return error_response(AppError::BadGateway(format!(
            "upstream status {}",
            response.status()
        )));
    }
    let is_html = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
        .unwrap_or(false);
    if !is_html {
        return error_response(AppError::UnsupportedMedia(
            "upstream did not return HTML".into(),
        ));
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(_) => {
            return error_response(AppError::BadGateway("upstream body unreadable".into()))
        }
    };
    let framed = frame_document(parsed.as_str(), &sanitize_proxy_html(&body));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_SECURITY_POLICY,
                "sandbox allow-same-origin".to_string(),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        framed,
    )
        .into_response()
}

// --- admin surface ---

pub async fn trigger_ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Admin, true) {
        return resp;
    }
    let who = match require_admin(&headers, &state.cfg) {
        Ok(who) => who,
        Err(resp) => return resp,
    };
    info!(admin = %who, "Manual ingest triggered");
    let ctx = Arc::clone(&state.ingest);
    tokio::spawn(async move {
        fetcher::run_cycle(&ctx).await;
    });
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"status": "started"})),
    )
        .into_response()
}

pub async fn admin_list_feeds(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Admin, false) {
        return resp;
    }
    if let Err(resp) = require_admin(&headers, &state.cfg) {
        return resp;
    }
    match state.db.get_feeds(ListScope::All) {
        Ok(feeds) => (StatusCode::OK, Json(serde_json::json!({"feeds": feeds}))).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn admin_put_feed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<SeedFeed>,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Admin, true) {
        return resp;
    }
    if let Err(resp) = require_admin(&headers, &state.cfg) {
        return resp;
    }
    let feed = match input.into_feed() {
        Ok(feed) => feed,
        Err(e) => return bad_request(&e.to_string()),
    };
    match state.db.put_feed(&feed) {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"feed": feed}))).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn admin_put_feed_by_id(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(feed_id): Path<String>,
    Json(mut input): Json<SeedFeed>,
) -> Response {
    input.id = feed_id;
    admin_put_feed(State(state), headers, Json(input)).await
}

pub async fn admin_delete_feed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(feed_id): Path<String>,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Admin, true) {
        return resp;
    }
    if let Err(resp) = require_admin(&headers, &state.cfg) {
        return resp;
    }
    match state.db.delete_feed(&feed_id) {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({"deleted": feed_id}))).into_response(),
        Ok(false) => error_response(AppError::NotFound("feed".into())),
        Err(e) => internal_error(e),
    }
}

pub async fn admin_review_queue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Admin, false) {
        return resp;
    }
    if let Err(resp) = require_admin(&headers, &state.cfg) {
        return resp;
    }
    let pairs = parse_query(raw.as_deref());
    let status = match first(&pairs, "status") {
        None => None,
        Some(raw) => match ReviewStatus::from_str(raw) {
            Some(status) => Some(status),
            None => return bad_request("unknown review status"),
        },
    };
    match state.db.list_review_queue(status, 200) {
        Ok(entries) => {
            (StatusCode::OK, Json(serde_json::json!({"queue": entries}))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub struct ReviewDecision {
    pub status: String,
    pub reviewed_summary: Option<String>,
    pub note: Option<String>,
}

pub async fn admin_review_decide(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
    Json(body): Json<ReviewDecision>,
) -> Response {
    if let Err(resp) = gate(&state, &headers, RateBucket::Admin, true) {
        return resp;
    }
    let reviewer = match require_admin(&headers, &state.cfg) {
        Ok(who) => who,
        Err(resp) => return resp,
    };
    let status = match ReviewStatus::from_str(&body.status) {
        Some(status) => status,
        None => return bad_request("status must be pending, approved, rejected, or edited"),
    };
    if status == ReviewStatus::Edited && body.reviewed_summary.is_none() {
        return bad_request("edited decisions require reviewed_summary");
    }
    match state.db.set_review_decision(
        &item_id,
        status,
        &reviewer,
        body.reviewed_summary.as_deref(),
        body.note.as_deref(),
    ) {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"item_id": item_id, "status": body.status})),
        )
            .into_response(),
        Ok(false) => error_response(AppError::NotFound("review entry".into())),
        Err(e) => internal_error(e),
    }
}

// --- health ---

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.db.feed_count() {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "feeds": count})),
        )
            .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded", "error": "database unavailable"})),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &str) -> Vec<(String, String)> {
        parse_query(Some(raw))
    }

    #[test]
    fn filter_defaults() {
        let filter = filter_from_pairs(&pairs(""), false).unwrap();
        assert_eq!(filter.scope, ListScope::Ky);
        assert_eq!(filter.hours, 2);
        assert_eq!(filter.limit, 30);
        assert!(filter.counties.is_empty());
        assert!(!filter.include_drafts);
    }

    #[test]
    fn hours_bounds_enforced() {
        assert!(filter_from_pairs(&pairs("hours=1"), false).is_ok());
        assert!(filter_from_pairs(&pairs("hours=8760"), false).is_ok());
        assert!(filter_from_pairs(&pairs("hours=0"), false).is_err());
        assert!(filter_from_pairs(&pairs("hours=8761"), false).is_err());
        assert!(filter_from_pairs(&pairs("hours=abc"), false).is_err());
    }

    #[test]
    fn limit_bounds_enforced() {
        assert!(filter_from_pairs(&pairs("limit=1"), false).is_ok());
        assert!(filter_from_pairs(&pairs("limit=100"), false).is_ok());
        assert!(filter_from_pairs(&pairs("limit=0"), false).is_err());
        assert!(filter_from_pairs(&pairs("limit=101"), false).is_err());
    }

    #[test]
    fn repeated_counties_collected() {
        let filter = filter_from_pairs(
            &pairs("counties[]=Pike&counties[]=Floyd&county=Pike"),
            false,
        )
        .unwrap();
        assert_eq!(filter.counties, vec!["Floyd".to_string(), "Pike".to_string()]);
    }

    #[test]
    fn state_must_be_two_letters() {
        assert!(filter_from_pairs(&pairs("state=KY"), false).is_ok());
        assert!(filter_from_pairs(&pairs("state=Kentucky"), false).is_err());
        assert!(filter_from_pairs(&pairs("state=K1"), false).is_err());
    }

    #[test]
    fn malformed_cursor_rejected() {
        assert!(filter_from_pairs(&pairs("cursor=notacursor"), false).is_err());
        assert!(filter_from_pairs(
            &pairs("cursor=2026-03-01T10:00:00%2B00:00%7Cabc"),
            false
        )
        .is_ok());
    }

    #[test]
    fn item_id_extracted_from_media_key() {
        assert_eq!(item_id_from_key("news/abc-123.jpg"), Some("abc-123"));
        assert_eq!(item_id_from_key("other/abc.jpg"), None);
        assert_eq!(item_id_from_key("news/noext"), None);
    }

    #[test]
    fn frame_injects_base() {
        let html = "<html><head><title>t</title></head><body>x</body></html>";
        let framed = frame_document("https://e.test/page", html);
        assert!(framed.contains("<base href=\"https://e.test/page\">"));
        assert!(framed.find("<base").unwrap() > framed.find("<head").unwrap());

        let fragment = "<p>no head</p>";
        let framed = frame_document("https://e.test/page", fragment);
        assert!(framed.starts_with("<!doctype html>"));
        assert!(framed.contains("<base href=\"https://e.test/page\">"));
    }

    #[test]
    fn error_responses_use_stable_statuses() {
        assert_eq!(
            error_response(AppError::Unauthorized).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            error_response(AppError::NotFound("item".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_response(AppError::UnsupportedMedia("text/plain".into())).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(bad_request("nope").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_response(AppError::Db("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn admin_identity_rules() {
        let mut cfg = AppConfig::default();
        // Fully unconfigured instance is open.
        assert!(admin_identity(&HeaderMap::new(), &cfg).is_some());

        cfg.admin_token = "secret".into();
        assert!(admin_identity(&HeaderMap::new(), &cfg).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-admin-token", "secret".parse().unwrap());
        assert_eq!(admin_identity(&headers, &cfg).as_deref(), Some("token"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        assert_eq!(admin_identity(&headers, &cfg).as_deref(), Some("token"));

        cfg.admin_emails = vec!["ed@example.com".into()];
        let mut headers = HeaderMap::new();
        headers.insert(
            "cf-access-authenticated-user-email",
            "ed@example.com".parse().unwrap(),
        );
        assert_eq!(
            admin_identity(&headers, &cfg).as_deref(),
            Some("ed@example.com")
        );
    }
}
