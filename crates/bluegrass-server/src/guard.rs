//! Origin-side request gating: per-IP minute-window rate limiting and the
//! bot-score check for guarded paths.

use crate::db::Db;
use axum::http::HeaderMap;
use chrono::Utc;

/// Seconds beyond the window the counter stays alive; late stragglers in
/// the same minute still see it.
const WINDOW_SECS: i64 = 60;
const COUNTER_GRACE_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateBucket {
    Read,
    Write,
    Admin,
}

impl RateBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_secs: i64,
}

/// Count this request against the caller's minute window and decide.
/// A counter failure fails open: a broken limiter must not take reads down.
pub fn check_rate_limit(db: &Db, bucket: RateBucket, ip: &str, limit: i64) -> RateDecision {
    let now = Utc::now().timestamp();
    let minute = now / WINDOW_SECS;
    let key = format!("rl:v2:{}:{}:{}", bucket.as_str(), ip, minute);
    let count = match db.kv_incr(&key, WINDOW_SECS + COUNTER_GRACE_SECS) {
        Ok(count) => count,
        Err(_) => 0,
    };
    RateDecision {
        allowed: count <= limit,
        remaining: (limit - count).max(0),
        reset_secs: WINDOW_SECS - (now % WINDOW_SECS),
    }
}

/// Client address as seen through the edge: connecting-IP header first,
/// then the first hop of X-Forwarded-For.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(ip) = headers.get("cf-connecting-ip").and_then(|v| v.to_str().ok()) {
        if !ip.is_empty() {
            return ip.to_string();
        }
    }
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !ip.is_empty() {
            return ip.to_string();
        }
    }
    "unknown".into()
}

/// Bot gate for admin paths, non-GET methods, and the open proxy.
/// Returns the rejection reason, or None to let the request through.
pub fn bot_gate(headers: &HeaderMap, min_score: f64) -> Option<&'static str> {
    let verified = headers
        .get("x-verified-bot")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if verified {
        return None;
    }

    if let Some(score) = headers
        .get("x-bot-score")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
    {
        if score.is_finite() && score < min_score {
            return Some("bot score below threshold");
        }
    }

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if user_agent.trim().is_empty() {
        return Some("missing user agent");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn counter_trips_at_limit() {
        let db = Db::open(":memory:").unwrap();
        for i in 1..=3 {
            let d = check_rate_limit(&db, RateBucket::Write, "1.2.3.4", 3);
            assert!(d.allowed, "request {i} should pass");
        }
        let d = check_rate_limit(&db, RateBucket::Write, "1.2.3.4", 3);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(d.reset_secs >= 1 && d.reset_secs <= 60);
    }

    #[test]
    fn buckets_and_ips_are_independent() {
        let db = Db::open(":memory:").unwrap();
        for _ in 0..3 {
            check_rate_limit(&db, RateBucket::Read, "1.2.3.4", 3);
        }
        assert!(!check_rate_limit(&db, RateBucket::Read, "1.2.3.4", 3).allowed);
        assert!(check_rate_limit(&db, RateBucket::Admin, "1.2.3.4", 3).allowed);
        assert!(check_rate_limit(&db, RateBucket::Read, "5.6.7.8", 3).allowed);
    }

    #[test]
    fn ip_header_priority() {
        let h = headers(&[
            ("cf-connecting-ip", "9.9.9.9"),
            ("x-forwarded-for", "1.1.1.1, 2.2.2.2"),
        ]);
        assert_eq!(client_ip(&h), "9.9.9.9");

        let h = headers(&[("x-forwarded-for", "1.1.1.1, 2.2.2.2")]);
        assert_eq!(client_ip(&h), "1.1.1.1");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn low_bot_score_rejected() {
        let h = headers(&[("x-bot-score", "5"), ("user-agent", "Mozilla/5.0")]);
        assert_eq!(bot_gate(&h, 18.0), Some("bot score below threshold"));

        let h = headers(&[("x-bot-score", "80"), ("user-agent", "Mozilla/5.0")]);
        assert_eq!(bot_gate(&h, 18.0), None);
    }

    #[test]
    fn verified_bot_bypasses() {
        let h = headers(&[("x-bot-score", "1"), ("x-verified-bot", "true")]);
        assert_eq!(bot_gate(&h, 18.0), None);
    }

    #[test]
    fn empty_user_agent_rejected() {
        assert_eq!(bot_gate(&HeaderMap::new(), 18.0), Some("missing user agent"));
        let h = headers(&[("user-agent", "curl/8.0")]);
        assert_eq!(bot_gate(&h, 18.0), None);
    }
}
