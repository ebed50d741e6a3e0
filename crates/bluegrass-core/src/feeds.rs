//! Seed feed configuration loaded from feeds.toml at first boot.
//! The database owns feeds afterwards; this file only fills an empty table.

use crate::error::{AppError, Result};
use crate::models::{Feed, FetchMode, RegionScope, ScraperKind};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct SeedFeed {
    pub id: String,
    pub name: String,
    pub category: String,
    pub url: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default = "default_scope")]
    pub region_scope: String,
    #[serde(default = "default_mode")]
    pub fetch_mode: String,
    #[serde(default)]
    pub scraper_id: Option<String>,
    /// Absent means enabled; the admin API passes `false` to pause a feed
    /// without deleting it.
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn default_state() -> String {
    "KY".into()
}

fn default_scope() -> String {
    "ky".into()
}

fn default_mode() -> String {
    "rss".into()
}

#[derive(Debug, Deserialize)]
pub struct FeedsFile {
    pub feeds: Vec<SeedFeed>,
}

impl FeedsFile {
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| AppError::Config(e.to_string()))
    }
}

impl SeedFeed {
    pub fn into_feed(self) -> Result<Feed> {
        let region_scope = RegionScope::from_str(&self.region_scope)
            .ok_or_else(|| AppError::Config(format!("Unknown region scope: {}", self.region_scope)))?;
        let fetch_mode = FetchMode::from_str(&self.fetch_mode)
            .ok_or_else(|| AppError::Config(format!("Unknown fetch mode: {}", self.fetch_mode)))?;
        let scraper_id = match self.scraper_id.as_deref() {
            None => None,
            Some(raw) => Some(
                ScraperKind::from_str(raw)
                    .ok_or_else(|| AppError::Config(format!("Unknown scraper id: {raw}")))?,
            ),
        };
        Ok(Feed {
            id: self.id,
            name: self.name,
            category: self.category,
            url: self.url,
            state: self.state,
            county: self.county,
            region_scope,
            fetch_mode,
            scraper_id,
            enabled: self.enabled.unwrap_or(true),
            etag: None,
            last_modified: None,
            last_checked: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
[[feeds]]
id = "herald-leader"
name = "Lexington Herald-Leader"
category = "news"
url = "https://www.kentucky.com/news/local/"
county = "Fayette"
fetch_mode = "scrape"
scraper_id = "mcclatchy-article"

[[feeds]]
id = "ky-lantern"
name = "Kentucky Lantern"
category = "politics"
url = "https://kentuckylantern.com/feed/"
"#;

    #[test]
    fn parse_seed_file() {
        let file = FeedsFile::from_toml(SAMPLE_TOML).unwrap();
        assert_eq!(file.feeds.len(), 2);

        let scraped = file.feeds[0].clone().into_feed().unwrap();
        assert_eq!(scraped.fetch_mode, FetchMode::Scrape);
        assert_eq!(scraped.scraper_id, Some(ScraperKind::McclatchyArticle));
        assert_eq!(scraped.county.as_deref(), Some("Fayette"));

        let rss = file.feeds[1].clone().into_feed().unwrap();
        assert_eq!(rss.fetch_mode, FetchMode::Rss);
        assert_eq!(rss.state, "KY");
        assert_eq!(rss.region_scope, RegionScope::Ky);
        assert!(rss.enabled);
    }

    #[test]
    fn enabled_false_survives_into_feed() {
        let toml = r#"
[[feeds]]
id = "paused"
name = "Paused Feed"
category = "news"
url = "https://paused.test/feed"
enabled = false
"#;
        let file = FeedsFile::from_toml(toml).unwrap();
        let feed = file.feeds[0].clone().into_feed().unwrap();
        assert!(!feed.enabled);
    }

    #[test]
    fn bad_mode_is_a_config_error() {
        let toml = r#"
[[feeds]]
id = "x"
name = "X"
category = "news"
url = "https://x.test/feed"
fetch_mode = "carrier-pigeon"
"#;
        let file = FeedsFile::from_toml(toml).unwrap();
        assert!(file.feeds[0].clone().into_feed().is_err());
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(FeedsFile::from_toml("not valid toml {{{}}}").is_err());
    }
}
