//! Content-addressed JSON response cache (C8).
//!
//! GET responses are stored as `{etag, payload, cachedAt}` envelopes in the
//! key-value store. The etag is content-derived, so a repeat producer run
//! that yields identical JSON revalidates instead of re-sending.

use crate::db::Db;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

pub const DEFAULT_STALE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub ttl: i64,
    pub stale: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    etag: String,
    payload: serde_json::Value,
    #[serde(rename = "cachedAt")]
    cached_at: String,
}

/// `api-cache:v2:<path>?<sorted_query>` — query order never splits the cache.
pub fn cache_key(path: &str, query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query.to_vec();
    pairs.sort();
    let qs = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("api-cache:v2:{path}?{qs}")
}

pub fn make_etag(payload: &str) -> String {
    let digest = hex::encode(Sha256::digest(payload.as_bytes()));
    format!("\"{}\"", &digest[..32])
}

fn cache_control_value(policy: CachePolicy) -> String {
    format!(
        "public, max-age={}, s-maxage={}, stale-while-revalidate={}",
        policy.ttl.min(60),
        policy.ttl,
        policy.stale
    )
}

/// True when the request must bypass the shared cache: authenticated admin
/// traffic and access-proxied identities see live data.
pub fn bypasses_cache(headers: &HeaderMap) -> bool {
    headers.contains_key("authorization")
        || headers.contains_key("x-admin-token")
        || headers.contains_key("cf-access-authenticated-user-email")
}

/// Serve a GET endpoint through the envelope cache.
pub fn cached_json(
    db: &Db,
    policy: CachePolicy,
    path: &str,
    query: &[(String, String)],
    headers: &HeaderMap,
    producer: impl FnOnce() -> Result<serde_json::Value, Response>,
) -> Response {
    if bypasses_cache(headers) {
        return match producer() {
            Ok(payload) => (
                StatusCode::OK,
                [(header::CACHE_CONTROL, "private, no-store".to_string())],
                Json(payload),
            )
                .into_response(),
            Err(resp) => resp,
        };
    }

    let key = cache_key(path, query);
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    if let Ok(Some(raw)) = db.kv_get(&key) {
        if let Ok(envelope) = serde_json::from_str::<Envelope>(&raw) {
            if if_none_match == Some(envelope.etag.as_str()) {
                return (
                    StatusCode::NOT_MODIFIED,
                    [
                        (header::ETAG, envelope.etag),
                        (header::CACHE_CONTROL, cache_control_value(policy)),
                        (header::HeaderName::from_static("x-cache"), "HIT".into()),
                    ],
                )
                    .into_response();
            }
            return (
                StatusCode::OK,
                [
                    (header::ETAG, envelope.etag),
                    (header::CACHE_CONTROL, cache_control_value(policy)),
                    (header::HeaderName::from_static("x-cache"), "HIT".into()),
                ],
                Json(envelope.payload),
            )
                .into_response();
        }
    }

    let payload = match producer() {
        Ok(payload) => payload,
        Err(resp) => return resp,
    };

    let serialized = match serde_json::to_string(&payload) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to serialize cache payload");
            return (StatusCode::OK, Json(payload)).into_response();
        }
    };
    let etag = make_etag(&serialized);
    let envelope = Envelope {
        etag: etag.clone(),
        payload,
        cached_at: Utc::now().to_rfc3339(),
    };
    if let Ok(raw) = serde_json::to_string(&envelope) {
        let store_ttl = policy.ttl + policy.stale.max(60);
        if let Err(e) = db.kv_set(&key, &raw, store_ttl) {
            warn!(error = %e, "Failed to store cache envelope");
        }
    }

    (
        StatusCode::OK,
        [
            (header::ETAG, etag),
            (header::CACHE_CONTROL, cache_control_value(policy)),
            (header::HeaderName::from_static("x-cache"), "MISS".into()),
        ],
        Json(envelope.payload),
    )
        .into_response()
}
