use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Leading substring of `published_at` that marks an item as a draft.
pub const DRAFT_SENTINEL_PREFIX: &str = "9999";

/// Geographic scope of a feed or item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RegionScope {
    Ky,
    National,
}

impl RegionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ky => "ky",
            Self::National => "national",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ky" => Some(Self::Ky),
            "national" => Some(Self::National),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a feed's listing is retrieved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    Rss,
    Scrape,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::Scrape => "scrape",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rss" => Some(Self::Rss),
            "scrape" => Some(Self::Scrape),
            _ => None,
        }
    }
}

/// CMS hint controlling path-shape scoring in the HTML scraper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScraperKind {
    GenericNews,
    GannettStory,
    TownnewsArticle,
    McclatchyArticle,
}

/// Static hostname hints for feeds configured without an explicit scraper id.
const SCRAPER_HOST_HINTS: &[(&str, ScraperKind)] = &[
    ("courier-journal.com", ScraperKind::GannettStory),
    ("usatoday.com", ScraperKind::GannettStory),
    ("kentucky.com", ScraperKind::McclatchyArticle),
    ("bgdailynews.com", ScraperKind::TownnewsArticle),
    ("thenewsenterprise.com", ScraperKind::TownnewsArticle),
    ("richmondregister.com", ScraperKind::TownnewsArticle),
];

impl ScraperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenericNews => "generic-news",
            Self::GannettStory => "gannett-story",
            Self::TownnewsArticle => "townnews-article",
            Self::McclatchyArticle => "mcclatchy-article",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "generic-news" => Some(Self::GenericNews),
            "gannett-story" => Some(Self::GannettStory),
            "townnews-article" => Some(Self::TownnewsArticle),
            "mcclatchy-article" => Some(Self::McclatchyArticle),
            _ => None,
        }
    }

    /// Pick a scraper kind for a hostname when the feed does not name one.
    pub fn for_host(host: &str) -> Self {
        let host = host.to_lowercase();
        SCRAPER_HOST_HINTS
            .iter()
            .find(|(suffix, _)| host == *suffix || host.ends_with(&format!(".{suffix}")))
            .map(|(_, kind)| *kind)
            .unwrap_or(Self::GenericNews)
    }
}

/// Publication status of an item. Drafts never surface on public reads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Draft,
    Published,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }

    /// Derive status from a stored timestamp; the far-future sentinel marks drafts.
    pub fn from_published_at(published_at: Option<&str>) -> Self {
        match published_at {
            Some(ts) if ts.starts_with(DRAFT_SENTINEL_PREFIX) => Self::Draft,
            _ => Self::Published,
        }
    }
}

/// A configured ingestion source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub name: String,
    pub category: String,
    pub url: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    pub region_scope: RegionScope,
    pub fetch_mode: FetchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraper_id: Option<ScraperKind>,
    pub enabled: bool,
    #[serde(skip_serializing, default)]
    pub etag: Option<String>,
    #[serde(skip_serializing, default)]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<String>,
}

/// A deduplicated article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub region_scope: RegionScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_checked_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_status: Option<u16>,
}

/// Geo tag for an item. County is empty for the state-wide row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ItemLocation {
    pub state: String,
    pub county: String,
}

impl ItemLocation {
    pub fn county(state: &str, county: &str) -> Self {
        Self {
            state: state.into(),
            county: county.into(),
        }
    }

    pub fn statewide(state: &str) -> Self {
        Self {
            state: state.into(),
            county: String::new(),
        }
    }
}

/// Paginated listing/search response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub items: Vec<Item>,
    pub next_cursor: Option<String>,
}

/// Authoritative row for a generated summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAiSummary {
    pub item_id: String,
    pub summary: String,
    pub model: String,
    pub source_hash: String,
    pub generated_at: String,
}

/// Mirrored-image record; exactly one per item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMedia {
    pub item_id: String,
    pub source_url: String,
    pub object_key: String,
    pub content_type: String,
    pub bytes: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Edited,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Edited => "edited",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "edited" => Some(Self::Edited),
            _ => None,
        }
    }
}

/// Why a summary landed in the review queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    AutoGenerated,
    SummaryTooShort,
    SummaryTooLong,
}

impl ReviewReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoGenerated => "auto_generated",
            Self::SummaryTooShort => "summary_too_short",
            Self::SummaryTooLong => "summary_too_long",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueEntry {
    pub item_id: String,
    pub status: ReviewStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-run totals written once at the end of an ingestion cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub feeds_processed: u32,
    pub feeds_updated: u32,
    pub items_seen: u32,
    pub items_upserted: u32,
    pub errors: u32,
}

/// Uniform parsed-item record produced by both the feed parser and the
/// HTML scraper, before classification and upsert.
#[derive(Debug, Clone, Default)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub guid: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub raw_date: Option<String>,
    pub snippet: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_scope_roundtrip() {
        for scope in [RegionScope::Ky, RegionScope::National] {
            assert_eq!(RegionScope::from_str(scope.as_str()), Some(scope));
        }
        assert_eq!(RegionScope::from_str("KY"), Some(RegionScope::Ky));
        assert_eq!(RegionScope::from_str("global"), None);
    }

    #[test]
    fn scraper_kind_by_host() {
        assert_eq!(
            ScraperKind::for_host("www.courier-journal.com"),
            ScraperKind::GannettStory
        );
        assert_eq!(
            ScraperKind::for_host("kentucky.com"),
            ScraperKind::McclatchyArticle
        );
        assert_eq!(
            ScraperKind::for_host("example.org"),
            ScraperKind::GenericNews
        );
    }

    #[test]
    fn draft_status_from_sentinel() {
        assert_eq!(
            ItemStatus::from_published_at(Some("9999-12-31T00:00:00Z")),
            ItemStatus::Draft
        );
        assert_eq!(
            ItemStatus::from_published_at(Some("2026-07-01T12:00:00Z")),
            ItemStatus::Published
        );
        assert_eq!(ItemStatus::from_published_at(None), ItemStatus::Published);
    }

    #[test]
    fn statewide_location_has_empty_county() {
        let loc = ItemLocation::statewide("KY");
        assert_eq!(loc.state, "KY");
        assert!(loc.county.is_empty());
    }
}
