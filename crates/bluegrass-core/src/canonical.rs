use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;
use url::{Host, Url};
use uuid::Uuid;

/// Namespace UUID for generating deterministic item IDs from canonical URLs.
const URL_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

fn tracking_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(utm_.*|gclid|fbclid|mc_eid|mkt_tok|outputType|output)$").unwrap()
    })
}

fn is_tracking_param(key: &str) -> bool {
    tracking_param_re().is_match(key)
}

/// Normalize a URL into item identity: https-only, fragment-free, tracking
/// params removed, trailing slashes collapsed. Returns None for anything
/// that is not http(s) or does not parse.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    match parsed.scheme() {
        "https" => {}
        "http" => parsed.set_scheme("https").ok()?,
        _ => return None,
    }
    parsed.host_str()?;

    parsed.set_fragment(None);

    let filtered: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if filtered.is_empty() {
        parsed.set_query(None);
    } else {
        let qs: Vec<String> = filtered
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect();
        parsed.set_query(Some(&qs.join("&")));
    }

    let trimmed = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(if trimmed.is_empty() { "/" } else { &trimmed });

    Some(parsed.to_string())
}

/// Deterministic item id for a canonical URL.
pub fn item_id_from_url(canonical_url: &str) -> String {
    Uuid::new_v5(&URL_NAMESPACE, canonical_url.as_bytes()).to_string()
}

/// Reject hosts the open proxy must never reach: loopback, link-local,
/// RFC-1918 ranges, and bare internal names.
pub fn is_private_host(url: &Url) -> bool {
    match url.host() {
        None => true,
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified(),
        Some(Host::Ipv6(ip)) => {
            ip.is_loopback()
                || ip.is_unspecified()
                || matches!(ip.segments()[0] & 0xfe00, 0xfc00)
                || matches!(ip.segments()[0] & 0xffc0, 0xfe80)
        }
        Some(Host::Domain(domain)) => {
            let domain = domain.to_lowercase();
            if let Ok(ip) = domain.parse::<IpAddr>() {
                return match ip {
                    IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
                    IpAddr::V6(v6) => v6.is_loopback(),
                };
            }
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
                || !domain.contains('.')
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forces_https_and_strips_fragment() {
        assert_eq!(
            canonicalize_url("http://example.com/news/story#comments").as_deref(),
            Some("https://example.com/news/story")
        );
    }

    #[test]
    fn strips_tracking_params_keeps_real_ones() {
        let got = canonicalize_url(
            "https://example.com/a?utm_source=x&utm_campaign=y&id=7&fbclid=abc&output=amp",
        );
        assert_eq!(got.as_deref(), Some("https://example.com/a?id=7"));
    }

    #[test]
    fn output_type_is_tracking_but_outputs_is_not() {
        let got = canonicalize_url("https://example.com/a?outputType=amp&outputs=2");
        assert_eq!(got.as_deref(), Some("https://example.com/a?outputs=2"));
    }

    #[test]
    fn collapses_trailing_slashes() {
        assert_eq!(
            canonicalize_url("https://example.com/news/local///").as_deref(),
            Some("https://example.com/news/local")
        );
        assert_eq!(
            canonicalize_url("https://example.com/").as_deref(),
            Some("https://example.com/")
        );
    }

    #[test]
    fn rejects_non_http() {
        assert_eq!(canonicalize_url("ftp://example.com/file"), None);
        assert_eq!(canonicalize_url("javascript:alert(1)"), None);
        assert_eq!(canonicalize_url("not a url"), None);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_url("HTTP://Example.com/a/?utm_source=t#frag").unwrap();
        let twice = canonicalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn same_canonical_url_same_id() {
        let a = canonicalize_url("https://example.com/story?utm_medium=social").unwrap();
        let b = canonicalize_url("http://example.com/story/").unwrap();
        assert_eq!(a, b);
        assert_eq!(item_id_from_url(&a), item_id_from_url(&b));
    }

    #[test]
    fn private_hosts_rejected() {
        for raw in [
            "https://localhost/x",
            "https://127.0.0.1/x",
            "https://10.1.2.3/x",
            "https://192.168.0.4/x",
            "https://169.254.1.1/x",
            "https://intranet/x",
            "https://printer.local/x",
        ] {
            let url = Url::parse(raw).unwrap();
            assert!(is_private_host(&url), "{raw} should be rejected");
        }
        let ok = Url::parse("https://www.kentucky.com/news").unwrap();
        assert!(!is_private_host(&ok));
    }
}
