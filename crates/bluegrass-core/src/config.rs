use std::time::Duration;

/// Outbound HTTP timeouts. Listing pages get the longest budget; metadata
/// probes the shortest so a slow origin cannot stall the inner fan-out.
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(15);
pub const ARTICLE_TIMEOUT: Duration = Duration::from_secs(12);
pub const META_TIMEOUT: Duration = Duration::from_secs(9);
pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(12);

/// Runtime options, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_origin: Option<String>,
    pub api_cache_ttl_seconds: u64,
    pub rate_limit_read_per_min: i64,
    pub rate_limit_write_per_min: i64,
    pub rate_limit_admin_per_min: i64,
    pub bot_score_min: f64,
    pub log_ttl_seconds: i64,
    pub error_event_ttl_days: i64,
    pub summary_cache_ttl_seconds: i64,
    pub ai_model: String,
    pub admin_emails: Vec<String>,
    pub editor_emails: Vec<String>,
    pub admin_token: String,
    pub ingest_interval_seconds: u64,
    pub ingest_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_origin: None,
            api_cache_ttl_seconds: 120,
            rate_limit_read_per_min: 240,
            rate_limit_write_per_min: 60,
            rate_limit_admin_per_min: 90,
            bot_score_min: 18.0,
            log_ttl_seconds: 1_209_600,
            error_event_ttl_days: 30,
            summary_cache_ttl_seconds: 2_592_000,
            ai_model: "claude-haiku-4-5-20251001".into(),
            admin_emails: Vec::new(),
            editor_emails: Vec::new(),
            admin_token: String::new(),
            ingest_interval_seconds: 300,
            ingest_concurrency: 8,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests can inject values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        fn parse<T: std::str::FromStr>(raw: Option<String>, fallback: T) -> T {
            raw.and_then(|v| v.parse().ok()).unwrap_or(fallback)
        }

        fn csv(raw: Option<String>) -> Vec<String> {
            raw.map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
        }

        Self {
            api_origin: lookup("API_ORIGIN").filter(|v| !v.is_empty()),
            api_cache_ttl_seconds: parse(
                lookup("API_CACHE_TTL_SECONDS"),
                defaults.api_cache_ttl_seconds,
            )
            .max(60),
            rate_limit_read_per_min: parse(
                lookup("RATE_LIMIT_READ_PER_MIN"),
                defaults.rate_limit_read_per_min,
            ),
            rate_limit_write_per_min: parse(
                lookup("RATE_LIMIT_WRITE_PER_MIN"),
                defaults.rate_limit_write_per_min,
            ),
            rate_limit_admin_per_min: parse(
                lookup("RATE_LIMIT_ADMIN_PER_MIN"),
                defaults.rate_limit_admin_per_min,
            ),
            bot_score_min: parse(lookup("BOT_SCORE_MIN"), defaults.bot_score_min),
            log_ttl_seconds: parse(lookup("LOG_TTL_SECONDS"), defaults.log_ttl_seconds),
            error_event_ttl_days: parse(
                lookup("ERROR_EVENT_TTL_DAYS"),
                defaults.error_event_ttl_days,
            ),
            summary_cache_ttl_seconds: parse(
                lookup("SUMMARY_CACHE_TTL_SECONDS"),
                defaults.summary_cache_ttl_seconds,
            ),
            ai_model: lookup("AI_MODEL")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.ai_model),
            admin_emails: csv(lookup("ADMIN_EMAILS")),
            editor_emails: csv(lookup("EDITOR_EMAILS")),
            admin_token: lookup("ADMIN_TOKEN").unwrap_or_default(),
            ingest_interval_seconds: parse(
                lookup("INGEST_INTERVAL_SECONDS"),
                defaults.ingest_interval_seconds,
            ),
            ingest_concurrency: parse(
                lookup("INGEST_CONCURRENCY"),
                defaults.ingest_concurrency,
            )
            .max(1),
        }
    }

    /// True when the given email (from an access-proxy header) may use admin
    /// write paths.
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.admin_emails.contains(&email) || self.editor_emails.contains(&email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.rate_limit_read_per_min, 240);
        assert_eq!(cfg.rate_limit_write_per_min, 60);
        assert_eq!(cfg.rate_limit_admin_per_min, 90);
        assert_eq!(cfg.bot_score_min, 18.0);
        assert_eq!(cfg.summary_cache_ttl_seconds, 2_592_000);
        assert_eq!(cfg.error_event_ttl_days, 30);
        assert_eq!(cfg.log_ttl_seconds, 1_209_600);
    }

    #[test]
    fn lookup_overrides_and_floors() {
        let mut vars = HashMap::new();
        vars.insert("API_CACHE_TTL_SECONDS", "30");
        vars.insert("RATE_LIMIT_READ_PER_MIN", "1000");
        vars.insert("ADMIN_EMAILS", "Editor@Example.com, ops@example.com");
        let cfg = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        // TTL floor keeps the cache from thrashing
        assert_eq!(cfg.api_cache_ttl_seconds, 60);
        assert_eq!(cfg.rate_limit_read_per_min, 1000);
        assert!(cfg.is_admin_email("editor@example.com"));
        assert!(!cfg.is_admin_email("nobody@example.com"));
    }

    #[test]
    fn garbage_values_fall_back() {
        let cfg = AppConfig::from_lookup(|k| {
            (k == "BOT_SCORE_MIN").then(|| "not-a-number".to_string())
        });
        assert_eq!(cfg.bot_score_min, 18.0);
    }
}
