use bluegrass_core::models::{
    Feed, FetchMode, Item, ItemAiSummary, ItemLocation, ItemMedia, ItemStatus, RegionScope,
    ReviewQueueEntry, ReviewStatus, RunSummary, ScraperKind,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::sync::Mutex;
use tracing::info;

pub struct Db {
    conn: Mutex<Connection>,
}

/// Row shape shared by every item query.
const ITEM_COLUMNS: &str = "id, title, url, author, region_scope, published_at, status, summary, \
     content, image_url, fetched_at, content_hash, article_checked_at, article_status, \
     COALESCE(published_at, fetched_at) AS sort_ts";

/// Input to the upsert path; everything the pipeline knows about an article
/// before persistence-side enrichment (summary, media) runs.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub region_scope: RegionScope,
    pub published_at: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub fetched_at: String,
    pub content_hash: Option<String>,
    pub article_checked_at: Option<String>,
    pub article_status: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    Ky,
    National,
    All,
}

impl ListScope {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ky" => Some(Self::Ky),
            "national" => Some(Self::National),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Newest,
    Oldest,
}

/// Filters shared by the listing and search queries.
#[derive(Debug, Clone)]
pub struct ItemFilter {
    pub scope: ListScope,
    pub feed_id: Option<String>,
    pub category: Option<String>,
    pub state: Option<String>,
    pub counties: Vec<String>,
    pub hours: i64,
    pub cursor: Option<(String, String)>,
    pub limit: i64,
    pub include_drafts: bool,
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self {
            scope: ListScope::All,
            feed_id: None,
            category: None,
            state: None,
            counties: Vec::new(),
            hours: 2,
            cursor: None,
            limit: 30,
            include_drafts: false,
        }
    }
}

/// Search adds free text and an explicit sort direction.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    pub tokens: Vec<String>,
    /// Counties named inside the query string; widens the text match.
    pub counties: Vec<String>,
    pub order: SortOrder,
}

pub fn encode_cursor(sort_ts: &str, id: &str) -> String {
    format!("{sort_ts}|{id}")
}

pub fn decode_cursor(cursor: &str) -> Option<(String, String)> {
    let (ts, id) = cursor.rsplit_once('|')?;
    if ts.is_empty() || id.is_empty() {
        return None;
    }
    Some((ts.to_string(), id.to_string()))
}

/// Over-fetch window for keyset pages: room for post-filter re-ranking
/// without unbounded scans.
fn fetch_window(limit: i64) -> i64 {
    (limit * 4).min(400)
}

impl Db {
    pub fn open(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| format!("SQLite open: {e}"))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| format!("SQLite pragma: {e}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS feeds (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                url TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'KY',
                county TEXT,
                region_scope TEXT NOT NULL DEFAULT 'ky',
                fetch_mode TEXT NOT NULL DEFAULT 'rss',
                scraper_id TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                etag TEXT,
                last_modified TEXT,
                last_checked TEXT
            );

            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                author TEXT,
                region_scope TEXT NOT NULL DEFAULT 'national',
                published_at TEXT,
                status TEXT NOT NULL DEFAULT 'published',
                summary TEXT,
                content TEXT,
                image_url TEXT,
                fetched_at TEXT NOT NULL,
                content_hash TEXT,
                article_checked_at TEXT,
                article_status INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_items_sort
                ON items(status, published_at DESC, id DESC);
            CREATE INDEX IF NOT EXISTS idx_items_scope
                ON items(region_scope, status);

            CREATE TABLE IF NOT EXISTS feed_items (
                feed_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                PRIMARY KEY (feed_id, item_id),
                FOREIGN KEY (feed_id) REFERENCES feeds(id) ON DELETE CASCADE,
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_feed_items_item ON feed_items(item_id);

            CREATE TABLE IF NOT EXISTS item_locations (
                item_id TEXT NOT NULL,
                state TEXT NOT NULL,
                county TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (item_id, state, county),
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_item_locations_place
                ON item_locations(state, county);

            CREATE TABLE IF NOT EXISTS item_ai_summaries (
                item_id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                model TEXT NOT NULL,
                source_hash TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS item_media (
                item_id TEXT PRIMARY KEY,
                source_url TEXT NOT NULL,
                object_key TEXT NOT NULL,
                content_type TEXT NOT NULL,
                bytes INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_item_media_key ON item_media(object_key);

            CREATE TABLE IF NOT EXISTS summary_review_queue (
                item_id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending',
                reason TEXT NOT NULL,
                reviewer TEXT,
                reviewed_at TEXT,
                reviewed_summary TEXT,
                note TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS fetch_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                feeds_processed INTEGER NOT NULL,
                feeds_updated INTEGER NOT NULL,
                items_seen INTEGER NOT NULL,
                items_upserted INTEGER NOT NULL,
                errors INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feed_run_metrics (
                run_id INTEGER NOT NULL,
                feed_id TEXT NOT NULL,
                items_seen INTEGER NOT NULL,
                items_upserted INTEGER NOT NULL,
                error TEXT,
                duration_ms INTEGER NOT NULL,
                PRIMARY KEY (run_id, feed_id)
            );

            CREATE TABLE IF NOT EXISTS app_error_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scope TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_error_events_expires
                ON app_error_events(expires_at);

            CREATE TABLE IF NOT EXISTS kv_cache (
                cache_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_kv_cache_expires ON kv_cache(expires_at);",
        )
        .map_err(|e| format!("SQLite schema: {e}"))?;

        info!(path, "SQLite database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- Feeds ---

    pub fn feed_count(&self) -> Result<i64, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.query_row("SELECT COUNT(*) FROM feeds", [], |row| row.get(0))
            .map_err(|e| format!("Feed count: {e}"))
    }

    pub fn put_feed(&self, feed: &Feed) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO feeds (id, name, category, url, state, county, region_scope,
                                fetch_mode, scraper_id, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                url = excluded.url,
                state = excluded.state,
                county = excluded.county,
                region_scope = excluded.region_scope,
                fetch_mode = excluded.fetch_mode,
                scraper_id = excluded.scraper_id,
                enabled = excluded.enabled",
            params![
                feed.id,
                feed.name,
                feed.category,
                feed.url,
                feed.state,
                feed.county,
                feed.region_scope.as_str(),
                feed.fetch_mode.as_str(),
                feed.scraper_id.map(|k| k.as_str()),
                feed.enabled as i32,
            ],
        )
        .map_err(|e| format!("Put feed: {e}"))?;
        info!(feed_id = %feed.id, name = %feed.name, "Feed saved");
        Ok(())
    }

    pub fn delete_feed(&self, feed_id: &str) -> Result<bool, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let deleted = conn
            .execute("DELETE FROM feeds WHERE id = ?1", params![feed_id])
            .map_err(|e| format!("Delete feed: {e}"))?;
        if deleted > 0 {
            info!(feed_id, "Feed deleted");
        }
        Ok(deleted > 0)
    }

    fn row_to_feed(row: &rusqlite::Row) -> rusqlite::Result<Feed> {
        let scope: String = row.get(6)?;
        let mode: String = row.get(7)?;
        let scraper: Option<String> = row.get(8)?;
        Ok(Feed {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            url: row.get(3)?,
            state: row.get(4)?,
            county: row.get(5)?,
            region_scope: RegionScope::from_str(&scope).unwrap_or(RegionScope::Ky),
            fetch_mode: FetchMode::from_str(&mode).unwrap_or(FetchMode::Rss),
            scraper_id: scraper.as_deref().and_then(ScraperKind::from_str),
            enabled: row.get::<_, i32>(9)? != 0,
            etag: row.get(10)?,
            last_modified: row.get(11)?,
            last_checked: row.get(12)?,
        })
    }

    pub fn get_feeds(&self, scope: ListScope) -> Result<Vec<Feed>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let base = "SELECT id, name, category, url, state, county, region_scope, fetch_mode,
                           scraper_id, enabled, etag, last_modified, last_checked
                    FROM feeds";
        let sql = match scope {
            ListScope::All => format!("{base} ORDER BY name ASC"),
            ListScope::Ky => format!("{base} WHERE region_scope = 'ky' ORDER BY name ASC"),
            ListScope::National => {
                format!("{base} WHERE region_scope = 'national' ORDER BY name ASC")
            }
        };
        let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
        let feeds = stmt
            .query_map([], Self::row_to_feed)
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
        Ok(feeds)
    }

    pub fn get_enabled_feeds(&self) -> Result<Vec<Feed>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, category, url, state, county, region_scope, fetch_mode,
                        scraper_id, enabled, etag, last_modified, last_checked
                 FROM feeds WHERE enabled = 1 ORDER BY id ASC",
            )
            .map_err(|e| e.to_string())?;
        let feeds = stmt
            .query_map([], Self::row_to_feed)
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
        Ok(feeds)
    }

    pub fn get_feed(&self, feed_id: &str) -> Result<Option<Feed>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, category, url, state, county, region_scope, fetch_mode,
                        scraper_id, enabled, etag, last_modified, last_checked
                 FROM feeds WHERE id = ?1",
            )
            .map_err(|e| e.to_string())?;
        let mut rows = stmt
            .query_map(params![feed_id], Self::row_to_feed)
            .map_err(|e| e.to_string())?;
        match rows.next() {
            Some(Ok(feed)) => Ok(Some(feed)),
            Some(Err(e)) => Err(e.to_string()),
            None => Ok(None),
        }
    }

    /// Store the conditional-GET validators after a 200, or just the check
    /// time after a 304.
    pub fn update_feed_validators(
        &self,
        feed_id: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE feeds SET
                etag = COALESCE(?2, etag),
                last_modified = COALESCE(?3, last_modified),
                last_checked = ?4
             WHERE id = ?1",
            params![feed_id, etag, last_modified, Utc::now().to_rfc3339()],
        )
        .map_err(|e| format!("Update validators: {e}"))?;
        Ok(())
    }

    // --- Items ---

    /// Idempotent upsert keyed on canonical URL. Mutable fields only move
    /// when the incoming value is non-null; `fetched_at` always refreshes.
    /// Returns true when the row was newly inserted.
    pub fn upsert_item(&self, item: &NewItem) -> Result<bool, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let existed: bool = conn
            .query_row(
                "SELECT 1 FROM items WHERE url = ?1",
                params![item.url],
                |_| Ok(true),
            )
            .unwrap_or(false);

        let status = ItemStatus::from_published_at(item.published_at.as_deref());
        conn.execute(
            "INSERT INTO items
                (id, title, url, author, region_scope, published_at, status, content,
                 image_url, fetched_at, content_hash, article_checked_at, article_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(url) DO UPDATE SET
                title = CASE WHEN excluded.title != '' THEN excluded.title ELSE items.title END,
                author = COALESCE(excluded.author, items.author),
                region_scope = excluded.region_scope,
                published_at = COALESCE(excluded.published_at, items.published_at),
                status = CASE
                    WHEN COALESCE(excluded.published_at, items.published_at) LIKE '9999%'
                    THEN 'draft' ELSE 'published' END,
                content = COALESCE(excluded.content, items.content),
                image_url = COALESCE(excluded.image_url, items.image_url),
                content_hash = COALESCE(excluded.content_hash, items.content_hash),
                article_checked_at = COALESCE(excluded.article_checked_at, items.article_checked_at),
                article_status = COALESCE(excluded.article_status, items.article_status),
                fetched_at = excluded.fetched_at",
            params![
                item.id,
                item.title,
                item.url,
                item.author,
                item.region_scope.as_str(),
                item.published_at,
                status.as_str(),
                item.content,
                item.image_url,
                item.fetched_at,
                item.content_hash,
                item.article_checked_at,
                item.article_status,
            ],
        )
        .map_err(|e| format!("Upsert item: {e}"))?;

        Ok(!existed)
    }

    pub fn link_feed_item(&self, feed_id: &str, item_id: &str) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT OR IGNORE INTO feed_items (feed_id, item_id) VALUES (?1, ?2)",
            params![feed_id, item_id],
        )
        .map_err(|e| format!("Link feed item: {e}"))?;
        Ok(())
    }

    /// Replace the location tag set inside one transaction so readers never
    /// observe an empty set mid-update.
    pub fn replace_item_locations(
        &self,
        item_id: &str,
        locations: &[ItemLocation],
    ) -> Result<(), String> {
        let mut conn = self.conn.lock().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| e.to_string())?;
        tx.execute(
            "DELETE FROM item_locations WHERE item_id = ?1",
            params![item_id],
        )
        .map_err(|e| format!("Clear locations: {e}"))?;
        for loc in locations {
            tx.execute(
                "INSERT OR IGNORE INTO item_locations (item_id, state, county) VALUES (?1, ?2, ?3)",
                params![item_id, loc.state, loc.county],
            )
            .map_err(|e| format!("Insert location: {e}"))?;
        }
        tx.commit().map_err(|e| format!("Commit locations: {e}"))?;
        Ok(())
    }

    pub fn get_item_locations(&self, item_id: &str) -> Result<Vec<ItemLocation>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare("SELECT state, county FROM item_locations WHERE item_id = ?1 ORDER BY state, county")
            .map_err(|e| e.to_string())?;
        let locations = stmt
            .query_map(params![item_id], |row| {
                Ok(ItemLocation {
                    state: row.get(0)?,
                    county: row.get(1)?,
                })
            })
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
        Ok(locations)
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<(Item, String)> {
        let scope: String = row.get(4)?;
        let status: String = row.get(6)?;
        let published: Option<String> = row.get(5)?;
        let fetched: String = row.get(10)?;
        let article_status: Option<i64> = row.get(13)?;
        let sort_ts: String = row.get(14)?;
        Ok((
            Item {
                id: row.get(0)?,
                title: row.get(1)?,
                url: row.get(2)?,
                author: row.get(3)?,
                region_scope: RegionScope::from_str(&scope).unwrap_or(RegionScope::National),
                published_at: published.and_then(|p| p.parse::<DateTime<Utc>>().ok()),
                status: ItemStatus::from_str(&status).unwrap_or(ItemStatus::Published),
                summary: row.get(7)?,
                content: row.get(8)?,
                image_url: row.get(9)?,
                fetched_at: fetched.parse().unwrap_or_default(),
                content_hash: row.get(11)?,
                article_checked_at: row.get(12)?,
                article_status: article_status.map(|s| s as u16),
            },
            sort_ts,
        ))
    }

    pub fn get_item(&self, id: &str) -> Result<Option<Item>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
        let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
        let mut rows = stmt
            .query_map(params![id], Self::row_to_item)
            .map_err(|e| e.to_string())?;
        match rows.next() {
            Some(Ok((item, _))) => Ok(Some(item)),
            Some(Err(e)) => Err(e.to_string()),
            None => Ok(None),
        }
    }

    pub fn get_item_by_url(&self, url: &str) -> Result<Option<Item>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE url = ?1");
        let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
        let mut rows = stmt
            .query_map(params![url], Self::row_to_item)
            .map_err(|e| e.to_string())?;
        match rows.next() {
            Some(Ok((item, _))) => Ok(Some(item)),
            Some(Err(e)) => Err(e.to_string()),
            None => Ok(None),
        }
    }

    /// Keyset-paginated listing/search. Returns at most `limit` items plus
    /// the cursor for the next page.
    pub fn query_items(
        &self,
        filter: &ItemFilter,
        search: Option<&SearchSpec>,
    ) -> Result<(Vec<Item>, Option<String>), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;

        let order = search.map(|s| s.order).unwrap_or(SortOrder::Newest);
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if !filter.include_drafts {
            clauses.push("i.status = 'published'".into());
        }

        match filter.scope {
            ListScope::All => {}
            ListScope::Ky => clauses.push("i.region_scope = 'ky'".into()),
            ListScope::National => clauses.push("i.region_scope = 'national'".into()),
        }

        let since = (Utc::now() - Duration::hours(filter.hours)).to_rfc3339();
        clauses.push("COALESCE(i.published_at, i.fetched_at) >= ?".into());
        values.push(Box::new(since));

        if let Some(feed_id) = &filter.feed_id {
            clauses.push(
                "EXISTS (SELECT 1 FROM feed_items fi WHERE fi.item_id = i.id AND fi.feed_id = ?)"
                    .into(),
            );
            values.push(Box::new(feed_id.clone()));
        }

        if let Some(category) = &filter.category {
            clauses.push(
                "EXISTS (SELECT 1 FROM feed_items fi JOIN feeds f ON f.id = fi.feed_id
                         WHERE fi.item_id = i.id AND f.category = ?)"
                    .into(),
            );
            values.push(Box::new(category.clone()));
        }

        if !filter.counties.is_empty() {
            let state = filter.state.clone().unwrap_or_else(|| "KY".into());
            let placeholders = vec!["?"; filter.counties.len()].join(", ");
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM item_locations il WHERE il.item_id = i.id
                         AND il.state = ? AND il.county IN ({placeholders}))"
            ));
            values.push(Box::new(state));
            for county in &filter.counties {
                values.push(Box::new(county.clone()));
            }
        } else if let Some(state) = &filter.state {
            clauses.push(
                "EXISTS (SELECT 1 FROM item_locations il WHERE il.item_id = i.id AND il.state = ?)"
                    .into(),
            );
            values.push(Box::new(state.clone()));
        }

        if let Some(spec) = search {
            let mut token_groups: Vec<String> = Vec::new();
            for token in &spec.tokens {
                token_groups
                    .push("(i.title LIKE ? OR i.summary LIKE ? OR i.content LIKE ?)".into());
                let like = format!("%{token}%");
                values.push(Box::new(like.clone()));
                values.push(Box::new(like.clone()));
                values.push(Box::new(like));
            }
            if !token_groups.is_empty() {
                let text_clause = token_groups.join(" AND ");
                if spec.counties.is_empty() {
                    clauses.push(format!("({text_clause})"));
                } else {
                    // A county named in the query widens the result set even
                    // when the text match is weak.
                    let placeholders = vec!["?"; spec.counties.len()].join(", ");
                    clauses.push(format!(
                        "(({text_clause}) OR EXISTS (
                            SELECT 1 FROM item_locations il
                            WHERE il.item_id = i.id AND il.county IN ({placeholders})))"
                    ));
                    for county in &spec.counties {
                        values.push(Box::new(county.clone()));
                    }
                }
            }
        }

        if let Some((ts, id)) = &filter.cursor {
            let predicate = match order {
                SortOrder::Newest => {
                    "(COALESCE(i.published_at, i.fetched_at) < ?
                      OR (COALESCE(i.published_at, i.fetched_at) = ? AND i.id < ?))"
                }
                SortOrder::Oldest => {
                    "(COALESCE(i.published_at, i.fetched_at) > ?
                      OR (COALESCE(i.published_at, i.fetched_at) = ? AND i.id > ?))"
                }
            };
            clauses.push(predicate.into());
            values.push(Box::new(ts.clone()));
            values.push(Box::new(ts.clone()));
            values.push(Box::new(id.clone()));
        }

        let direction = match order {
            SortOrder::Newest => "DESC",
            SortOrder::Oldest => "ASC",
        };
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items i {where_clause}
             ORDER BY COALESCE(i.published_at, i.fetched_at) {direction}, i.id {direction}
             LIMIT ?"
        );
        values.push(Box::new(fetch_window(filter.limit)));

        let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_item)
            .map_err(|e| e.to_string())?;
        let mut items: Vec<(Item, String)> = rows.filter_map(|r| r.ok()).collect();

        let next_cursor = if items.len() as i64 > filter.limit {
            items.truncate(filter.limit as usize);
            items
                .last()
                .map(|(item, sort_ts)| encode_cursor(sort_ts, &item.id))
        } else {
            None
        };

        Ok((items.into_iter().map(|(item, _)| item).collect(), next_cursor))
    }

    /// County rollup for the disclosure endpoint.
    pub fn county_counts(&self, state: &str, hours: i64) -> Result<Vec<(String, i64)>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let since = (Utc::now() - Duration::hours(hours)).to_rfc3339();
        let mut stmt = conn
            .prepare(
                "SELECT il.county, COUNT(DISTINCT i.id) AS n
                 FROM item_locations il
                 JOIN items i ON i.id = il.item_id
                 WHERE il.state = ?1 AND il.county != '' AND i.status = 'published'
                   AND COALESCE(i.published_at, i.fetched_at) >= ?2
                 GROUP BY il.county
                 ORDER BY n DESC, il.county ASC",
            )
            .map_err(|e| e.to_string())?;
        let counts = stmt
            .query_map(params![state, since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
        Ok(counts)
    }

    pub fn update_item_summary(&self, item_id: &str, summary: &str) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE items SET summary = ?1 WHERE id = ?2",
            params![summary, item_id],
        )
        .map_err(|e| format!("Update summary: {e}"))?;
        Ok(())
    }

    pub fn update_item_image(&self, item_id: &str, image_url: &str) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE items SET image_url = ?1 WHERE id = ?2",
            params![image_url, item_id],
        )
        .map_err(|e| format!("Update image: {e}"))?;
        Ok(())
    }

    // --- AI summaries ---

    pub fn get_ai_summary(&self, item_id: &str) -> Result<Option<ItemAiSummary>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT item_id, summary, model, source_hash, generated_at
                 FROM item_ai_summaries WHERE item_id = ?1",
            )
            .map_err(|e| e.to_string())?;
        let mut rows = stmt
            .query_map(params![item_id], |row| {
                Ok(ItemAiSummary {
                    item_id: row.get(0)?,
                    summary: row.get(1)?,
                    model: row.get(2)?,
                    source_hash: row.get(3)?,
                    generated_at: row.get(4)?,
                })
            })
            .map_err(|e| e.to_string())?;
        match rows.next() {
            Some(Ok(summary)) => Ok(Some(summary)),
            Some(Err(e)) => Err(e.to_string()),
            None => Ok(None),
        }
    }

    pub fn upsert_ai_summary(&self, summary: &ItemAiSummary) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO item_ai_summaries (item_id, summary, model, source_hash, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(item_id) DO UPDATE SET
                summary = excluded.summary,
                model = excluded.model,
                source_hash = excluded.source_hash,
                generated_at = excluded.generated_at",
            params![
                summary.item_id,
                summary.summary,
                summary.model,
                summary.source_hash,
                summary.generated_at,
            ],
        )
        .map_err(|e| format!("Upsert AI summary: {e}"))?;
        Ok(())
    }

    // --- Review queue ---

    pub fn upsert_review(&self, item_id: &str, reason: &str) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO summary_review_queue (item_id, status, reason, created_at, updated_at)
             VALUES (?1, 'pending', ?2, ?3, ?3)
             ON CONFLICT(item_id) DO UPDATE SET
                reason = excluded.reason,
                status = 'pending',
                updated_at = excluded.updated_at",
            params![item_id, reason, now],
        )
        .map_err(|e| format!("Upsert review: {e}"))?;
        Ok(())
    }

    /// Record an admin decision. An `edited` decision also writes the
    /// reviewed summary through to the item.
    pub fn set_review_decision(
        &self,
        item_id: &str,
        status: ReviewStatus,
        reviewer: &str,
        reviewed_summary: Option<&str>,
        note: Option<&str>,
    ) -> Result<bool, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let now = Utc::now().to_rfc3339();
        let updated = conn
            .execute(
                "UPDATE summary_review_queue SET
                    status = ?2, reviewer = ?3, reviewed_at = ?4,
                    reviewed_summary = COALESCE(?5, reviewed_summary),
                    note = COALESCE(?6, note), updated_at = ?4
                 WHERE item_id = ?1",
                params![item_id, status.as_str(), reviewer, now, reviewed_summary, note],
            )
            .map_err(|e| format!("Review decision: {e}"))?;
        if updated == 0 {
            return Ok(false);
        }
        if status == ReviewStatus::Edited {
            if let Some(summary) = reviewed_summary {
                conn.execute(
                    "UPDATE items SET summary = ?1 WHERE id = ?2",
                    params![summary, item_id],
                )
                .map_err(|e| format!("Apply edited summary: {e}"))?;
            }
        }
        Ok(true)
    }

    pub fn list_review_queue(
        &self,
        status: Option<ReviewStatus>,
        limit: i64,
    ) -> Result<Vec<ReviewQueueEntry>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let base = "SELECT item_id, status, reason, reviewer, reviewed_at, reviewed_summary,
                           note, created_at, updated_at
                    FROM summary_review_queue";
        let (sql, has_status) = match status {
            Some(_) => (
                format!("{base} WHERE status = ?1 ORDER BY updated_at DESC LIMIT ?2"),
                true,
            ),
            None => (format!("{base} ORDER BY updated_at DESC LIMIT ?1"), false),
        };
        let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<ReviewQueueEntry> {
            let status_str: String = row.get(1)?;
            Ok(ReviewQueueEntry {
                item_id: row.get(0)?,
                status: ReviewStatus::from_str(&status_str).unwrap_or(ReviewStatus::Pending),
                reason: row.get(2)?,
                reviewer: row.get(3)?,
                reviewed_at: row.get(4)?,
                reviewed_summary: row.get(5)?,
                note: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        };
        let entries = if has_status {
            stmt.query_map(params![status.unwrap().as_str(), limit], map_row)
        } else {
            stmt.query_map(params![limit], map_row)
        }
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();
        Ok(entries)
    }

    // --- Media ---

    pub fn get_media(&self, item_id: &str) -> Result<Option<ItemMedia>, String> {
        self.media_query("SELECT item_id, source_url, object_key, content_type, bytes, updated_at
                          FROM item_media WHERE item_id = ?1", item_id)
    }

    pub fn get_media_by_key(&self, object_key: &str) -> Result<Option<ItemMedia>, String> {
        self.media_query("SELECT item_id, source_url, object_key, content_type, bytes, updated_at
                          FROM item_media WHERE object_key = ?1", object_key)
    }

    fn media_query(&self, sql: &str, param: &str) -> Result<Option<ItemMedia>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn.prepare(sql).map_err(|e| e.to_string())?;
        let mut rows = stmt
            .query_map(params![param], |row| {
                Ok(ItemMedia {
                    item_id: row.get(0)?,
                    source_url: row.get(1)?,
                    object_key: row.get(2)?,
                    content_type: row.get(3)?,
                    bytes: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .map_err(|e| e.to_string())?;
        match rows.next() {
            Some(Ok(media)) => Ok(Some(media)),
            Some(Err(e)) => Err(e.to_string()),
            None => Ok(None),
        }
    }

    pub fn upsert_media(&self, media: &ItemMedia) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO item_media (item_id, source_url, object_key, content_type, bytes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(item_id) DO UPDATE SET
                source_url = excluded.source_url,
                object_key = excluded.object_key,
                content_type = excluded.content_type,
                bytes = excluded.bytes,
                updated_at = excluded.updated_at",
            params![
                media.item_id,
                media.source_url,
                media.object_key,
                media.content_type,
                media.bytes,
                media.updated_at,
            ],
        )
        .map_err(|e| format!("Upsert media: {e}"))?;
        Ok(())
    }

    // --- Run metrics ---

    pub fn insert_fetch_run(
        &self,
        run: &RunSummary,
        started_at: &str,
        finished_at: &str,
    ) -> Result<i64, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO fetch_runs
                (started_at, finished_at, feeds_processed, feeds_updated,
                 items_seen, items_upserted, errors)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                started_at,
                finished_at,
                run.feeds_processed,
                run.feeds_updated,
                run.items_seen,
                run.items_upserted,
                run.errors,
            ],
        )
        .map_err(|e| format!("Insert fetch run: {e}"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_feed_run_metric(
        &self,
        run_id: i64,
        feed_id: &str,
        items_seen: u32,
        items_upserted: u32,
        error: Option<&str>,
        duration_ms: i64,
    ) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT OR REPLACE INTO feed_run_metrics
                (run_id, feed_id, items_seen, items_upserted, error, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, feed_id, items_seen, items_upserted, error, duration_ms],
        )
        .map_err(|e| format!("Insert feed metric: {e}"))?;
        Ok(())
    }

    pub fn feed_run_metrics(&self, run_id: i64) -> Result<Vec<(String, u32, u32, Option<String>)>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT feed_id, items_seen, items_upserted, error
                 FROM feed_run_metrics WHERE run_id = ?1 ORDER BY feed_id",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- Error events ---

    pub fn insert_error_event(
        &self,
        scope: &str,
        message: &str,
        ttl_days: i64,
    ) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let now = Utc::now();
        let expires = now + Duration::days(ttl_days);
        conn.execute(
            "INSERT INTO app_error_events (scope, message, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![scope, message, now.to_rfc3339(), expires.to_rfc3339()],
        )
        .map_err(|e| format!("Insert error event: {e}"))?;
        Ok(())
    }

    pub fn cleanup_expired_error_events(&self) -> Result<usize, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "DELETE FROM app_error_events WHERE expires_at < ?1",
            params![now],
        )
        .map_err(|e| format!("Cleanup error events: {e}"))
    }

    // --- Key-value cache ---

    pub fn kv_get(&self, cache_key: &str) -> Result<Option<String>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn
            .prepare("SELECT payload FROM kv_cache WHERE cache_key = ?1 AND expires_at > ?2")
            .map_err(|e| e.to_string())?;
        let result: Option<String> = stmt.query_row(params![cache_key, now], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn kv_set(&self, cache_key: &str, payload: &str, ttl_secs: i64) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let now = Utc::now();
        let expires = now + Duration::seconds(ttl_secs);
        conn.execute(
            "INSERT OR REPLACE INTO kv_cache (cache_key, payload, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![cache_key, payload, now.to_rfc3339(), expires.to_rfc3339()],
        )
        .map_err(|e| format!("KV set: {e}"))?;
        Ok(())
    }

    /// Atomic counter used by the rate limiter; the expiry is fixed by the
    /// first hit in the window.
    pub fn kv_incr(&self, cache_key: &str, ttl_secs: i64) -> Result<i64, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let now = Utc::now();
        let expires = now + Duration::seconds(ttl_secs);
        conn.execute(
            "INSERT INTO kv_cache (cache_key, payload, created_at, expires_at)
             VALUES (?1, '1', ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET
                payload = CAST(CAST(payload AS INTEGER) + 1 AS TEXT)",
            params![cache_key, now.to_rfc3339(), expires.to_rfc3339()],
        )
        .map_err(|e| format!("KV incr: {e}"))?;
        conn.query_row(
            "SELECT CAST(payload AS INTEGER) FROM kv_cache WHERE cache_key = ?1",
            params![cache_key],
            |row| row.get(0),
        )
        .map_err(|e| format!("KV incr read: {e}"))
    }

    pub fn cleanup_expired_kv(&self) -> Result<usize, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let now = Utc::now().to_rfc3339();
        conn.execute("DELETE FROM kv_cache WHERE expires_at < ?1", params![now])
            .map_err(|e| format!("Cleanup kv: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluegrass_core::canonical::item_id_from_url;

    fn test_db() -> Db {
        Db::open(":memory:").unwrap()
    }

    fn new_item(url: &str, title: &str, published_at: Option<&str>) -> NewItem {
        NewItem {
            id: item_id_from_url(url),
            title: title.into(),
            url: url.into(),
            author: None,
            region_scope: RegionScope::Ky,
            published_at: published_at.map(str::to_string),
            content: None,
            image_url: None,
            fetched_at: Utc::now().to_rfc3339(),
            content_hash: None,
            article_checked_at: None,
            article_status: None,
        }
    }

    fn seed_feed(db: &Db, id: &str, category: &str) {
        db.put_feed(&Feed {
            id: id.into(),
            name: id.into(),
            category: category.into(),
            url: format!("https://{id}.test/feed"),
            state: "KY".into(),
            county: None,
            region_scope: RegionScope::Ky,
            fetch_mode: FetchMode::Rss,
            scraper_id: None,
            enabled: true,
            etag: None,
            last_modified: None,
            last_checked: None,
        })
        .unwrap();
    }

    #[test]
    fn upsert_is_idempotent() {
        let db = test_db();
        let item = new_item("https://e.test/a", "First", Some("2026-03-01T10:00:00+00:00"));
        assert!(db.upsert_item(&item).unwrap());
        assert!(!db.upsert_item(&item).unwrap());

        let stored = db.get_item_by_url("https://e.test/a").unwrap().unwrap();
        assert_eq!(stored.title, "First");
    }

    #[test]
    fn upsert_keeps_existing_values_on_null() {
        let db = test_db();
        let mut item = new_item("https://e.test/a", "Headline", Some("2026-03-01T10:00:00+00:00"));
        item.author = Some("A. Writer".into());
        item.content = Some("Body text".into());
        db.upsert_item(&item).unwrap();

        // A later ingest without author/content must not erase them.
        let sparse = new_item("https://e.test/a", "Headline", None);
        db.upsert_item(&sparse).unwrap();

        let stored = db.get_item_by_url("https://e.test/a").unwrap().unwrap();
        assert_eq!(stored.author.as_deref(), Some("A. Writer"));
        assert_eq!(stored.content.as_deref(), Some("Body text"));
        assert!(stored.published_at.is_some());
    }

    #[test]
    fn draft_sentinel_sets_status() {
        let db = test_db();
        let draft = new_item("https://e.test/d", "Draft", Some("9999-12-31T00:00:00+00:00"));
        db.upsert_item(&draft).unwrap();
        let stored = db.get_item_by_url("https://e.test/d").unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Draft);

        // Publishing flips the status.
        let published = new_item("https://e.test/d", "Draft", Some("2026-03-01T10:00:00+00:00"));
        db.upsert_item(&published).unwrap();
        let stored = db.get_item_by_url("https://e.test/d").unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Published);
    }

    #[test]
    fn drafts_hidden_from_public_queries() {
        let db = test_db();
        db.upsert_item(&new_item("https://e.test/p", "Public", Some("2026-03-01T10:00:00+00:00")))
            .unwrap();
        db.upsert_item(&new_item("https://e.test/d", "Draft", Some("9999-12-31T00:00:00+00:00")))
            .unwrap();

        let filter = ItemFilter {
            hours: 24 * 365_000,
            ..ItemFilter::default()
        };
        let (items, _) = db.query_items(&filter, None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Public");

        let admin = ItemFilter {
            include_drafts: true,
            ..filter
        };
        let (items, _) = db.query_items(&admin, None).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn keyset_pagination_covers_all_rows() {
        let db = test_db();
        for i in 0..75 {
            let ts = format!("2026-03-01T{:02}:{:02}:00+00:00", i / 60, i % 60);
            db.upsert_item(&new_item(
                &format!("https://e.test/{i}"),
                &format!("Story {i}"),
                Some(&ts),
            ))
            .unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        let mut last_sort_key: Option<String> = None;
        loop {
            let filter = ItemFilter {
                hours: 24 * 365_000,
                limit: 30,
                cursor: cursor.as_deref().and_then(decode_cursor),
                ..ItemFilter::default()
            };
            let (items, next) = db.query_items(&filter, None).unwrap();
            pages += 1;
            for item in &items {
                let key = item.published_at.unwrap().to_rfc3339();
                if let Some(prev) = &last_sort_key {
                    assert!(key <= *prev, "sort key must be monotonically decreasing");
                }
                last_sort_key = Some(key);
                assert!(seen.insert(item.id.clone()), "duplicate id across pages");
            }
            match next {
                Some(next_cursor) => cursor = Some(next_cursor),
                None => break,
            }
        }
        assert_eq!(seen.len(), 75);
        assert_eq!(pages, 3);
    }

    #[test]
    fn cursor_roundtrip() {
        let cursor = encode_cursor("2026-03-01T10:00:00+00:00", "abc-123");
        assert_eq!(
            decode_cursor(&cursor),
            Some(("2026-03-01T10:00:00+00:00".into(), "abc-123".into()))
        );
        assert_eq!(decode_cursor("garbage"), None);
    }

    #[test]
    fn location_replace_is_atomic_and_nonempty_between_upserts() {
        let db = test_db();
        let item = new_item("https://e.test/a", "A", Some("2026-03-01T10:00:00+00:00"));
        db.upsert_item(&item).unwrap();

        db.replace_item_locations(
            &item.id,
            &[ItemLocation::county("KY", "Pike"), ItemLocation::statewide("KY")],
        )
        .unwrap();
        assert_eq!(db.get_item_locations(&item.id).unwrap().len(), 2);

        db.replace_item_locations(
            &item.id,
            &[ItemLocation::county("KY", "Floyd"), ItemLocation::statewide("KY")],
        )
        .unwrap();
        let locations = db.get_item_locations(&item.id).unwrap();
        assert_eq!(locations.len(), 2);
        assert!(locations.contains(&ItemLocation::county("KY", "Floyd")));
    }

    #[test]
    fn county_filter_and_rollup() {
        let db = test_db();
        let a = new_item("https://e.test/a", "Pike story", Some("2026-03-01T10:00:00+00:00"));
        let b = new_item("https://e.test/b", "Floyd story", Some("2026-03-01T11:00:00+00:00"));
        db.upsert_item(&a).unwrap();
        db.upsert_item(&b).unwrap();
        db.replace_item_locations(&a.id, &[ItemLocation::county("KY", "Pike"), ItemLocation::statewide("KY")])
            .unwrap();
        db.replace_item_locations(&b.id, &[ItemLocation::county("KY", "Floyd"), ItemLocation::statewide("KY")])
            .unwrap();

        let filter = ItemFilter {
            hours: 24 * 365_000,
            counties: vec!["Pike".into()],
            ..ItemFilter::default()
        };
        let (items, _) = db.query_items(&filter, None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Pike story");

        let counts = db.county_counts("KY", 24 * 365_000).unwrap();
        assert_eq!(counts.len(), 2);
        assert!(counts.contains(&("Pike".into(), 1)));
    }

    #[test]
    fn search_tokens_and_county_widening() {
        let db = test_db();
        let a = new_item(
            "https://e.test/a",
            "Bridge repairs begin downtown",
            Some("2026-03-01T10:00:00+00:00"),
        );
        let b = new_item(
            "https://e.test/b",
            "School calendar approved",
            Some("2026-03-01T11:00:00+00:00"),
        );
        db.upsert_item(&a).unwrap();
        db.upsert_item(&b).unwrap();
        db.replace_item_locations(&b.id, &[ItemLocation::county("KY", "Pike")])
            .unwrap();

        let filter = ItemFilter {
            hours: 24 * 365_000,
            ..ItemFilter::default()
        };

        let spec = SearchSpec {
            tokens: vec!["bridge".into(), "repairs".into()],
            counties: vec![],
            order: SortOrder::Newest,
        };
        let (items, _) = db.query_items(&filter, Some(&spec)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Bridge repairs begin downtown");

        // "Pike" in the query widens to county-tagged items with no text hit.
        let spec = SearchSpec {
            tokens: vec!["pike".into()],
            counties: vec!["Pike".into()],
            order: SortOrder::Newest,
        };
        let (items, _) = db.query_items(&filter, Some(&spec)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "School calendar approved");
    }

    #[test]
    fn search_oldest_inverts_direction() {
        let db = test_db();
        for (i, url) in ["https://e.test/a", "https://e.test/b"].iter().enumerate() {
            db.upsert_item(&new_item(
                url,
                &format!("Council meeting {i}"),
                Some(&format!("2026-03-0{}T10:00:00+00:00", i + 1)),
            ))
            .unwrap();
        }
        let filter = ItemFilter {
            hours: 24 * 365_000,
            ..ItemFilter::default()
        };
        let spec = SearchSpec {
            tokens: vec!["council".into()],
            counties: vec![],
            order: SortOrder::Oldest,
        };
        let (items, _) = db.query_items(&filter, Some(&spec)).unwrap();
        assert_eq!(items[0].title, "Council meeting 0");
        assert_eq!(items[1].title, "Council meeting 1");
    }

    #[test]
    fn feed_edges_are_idempotent() {
        let db = test_db();
        seed_feed(&db, "feed-a", "news");
        seed_feed(&db, "feed-b", "news");
        let item = new_item("https://e.test/a", "Shared", Some("2026-03-01T10:00:00+00:00"));
        db.upsert_item(&item).unwrap();
        db.link_feed_item("feed-a", &item.id).unwrap();
        db.link_feed_item("feed-a", &item.id).unwrap();
        db.link_feed_item("feed-b", &item.id).unwrap();

        let filter = ItemFilter {
            hours: 24 * 365_000,
            feed_id: Some("feed-b".into()),
            ..ItemFilter::default()
        };
        let (items, _) = db.query_items(&filter, None).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn category_filter_via_feed_edge() {
        let db = test_db();
        seed_feed(&db, "sports-wire", "sports");
        seed_feed(&db, "news-wire", "news");
        let a = new_item("https://e.test/a", "Game recap", Some("2026-03-01T10:00:00+00:00"));
        let b = new_item("https://e.test/b", "Tax vote", Some("2026-03-01T11:00:00+00:00"));
        db.upsert_item(&a).unwrap();
        db.upsert_item(&b).unwrap();
        db.link_feed_item("sports-wire", &a.id).unwrap();
        db.link_feed_item("news-wire", &b.id).unwrap();

        let filter = ItemFilter {
            hours: 24 * 365_000,
            category: Some("sports".into()),
            ..ItemFilter::default()
        };
        let (items, _) = db.query_items(&filter, None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Game recap");
    }

    #[test]
    fn validators_survive_304_updates() {
        let db = test_db();
        seed_feed(&db, "feed-a", "news");
        db.update_feed_validators("feed-a", Some("\"v1\""), Some("Mon, 01 Mar 2026 10:00:00 GMT"))
            .unwrap();
        // A 304 refresh carries no new validators.
        db.update_feed_validators("feed-a", None, None).unwrap();
        let feed = db.get_feed("feed-a").unwrap().unwrap();
        assert_eq!(feed.etag.as_deref(), Some("\"v1\""));
        assert!(feed.last_checked.is_some());
    }

    #[test]
    fn kv_roundtrip_and_counter() {
        let db = test_db();
        db.kv_set("k", "payload", 60).unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("payload"));
        assert_eq!(db.kv_get("missing").unwrap(), None);

        assert_eq!(db.kv_incr("rl:test", 90).unwrap(), 1);
        assert_eq!(db.kv_incr("rl:test", 90).unwrap(), 2);
        assert_eq!(db.kv_incr("rl:test", 90).unwrap(), 3);
    }

    #[test]
    fn expired_kv_invisible() {
        let db = test_db();
        db.kv_set("gone", "x", -5).unwrap();
        assert_eq!(db.kv_get("gone").unwrap(), None);
        assert_eq!(db.cleanup_expired_kv().unwrap(), 1);
    }

    #[test]
    fn review_queue_upsert_and_decision() {
        let db = test_db();
        let item = new_item("https://e.test/a", "A", Some("2026-03-01T10:00:00+00:00"));
        db.upsert_item(&item).unwrap();

        db.upsert_review(&item.id, "auto_generated").unwrap();
        db.upsert_review(&item.id, "summary_too_short").unwrap();
        let entries = db.list_review_queue(Some(ReviewStatus::Pending), 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "summary_too_short");

        let ok = db
            .set_review_decision(&item.id, ReviewStatus::Edited, "ed@example.com", Some("Edited text"), None)
            .unwrap();
        assert!(ok);
        let stored = db.get_item(&item.id).unwrap().unwrap();
        assert_eq!(stored.summary.as_deref(), Some("Edited text"));
    }

    #[test]
    fn media_upsert_single_row_per_item() {
        let db = test_db();
        let item = new_item("https://e.test/a", "A", Some("2026-03-01T10:00:00+00:00"));
        db.upsert_item(&item).unwrap();

        let first = ItemMedia {
            item_id: item.id.clone(),
            source_url: "https://cdn.test/a.jpg".into(),
            object_key: format!("news/{}.jpg", item.id),
            content_type: "image/jpeg".into(),
            bytes: 1000,
            updated_at: Utc::now().to_rfc3339(),
        };
        db.upsert_media(&first).unwrap();
        let second = ItemMedia {
            source_url: "https://cdn.test/b.webp".into(),
            object_key: format!("news/{}.webp", item.id),
            content_type: "image/webp".into(),
            ..first.clone()
        };
        db.upsert_media(&second).unwrap();

        let media = db.get_media(&item.id).unwrap().unwrap();
        assert_eq!(media.content_type, "image/webp");
        assert!(db
            .get_media_by_key(&format!("news/{}.webp", item.id))
            .unwrap()
            .is_some());
    }

    #[test]
    fn run_metrics_recorded() {
        let db = test_db();
        seed_feed(&db, "feed-a", "news");
        let run = RunSummary {
            feeds_processed: 1,
            feeds_updated: 1,
            items_seen: 3,
            items_upserted: 1,
            errors: 0,
        };
        let now = Utc::now().to_rfc3339();
        let run_id = db.insert_fetch_run(&run, &now, &now).unwrap();
        db.insert_feed_run_metric(run_id, "feed-a", 3, 1, None, 250)
            .unwrap();
        let metrics = db.feed_run_metrics(run_id).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].1, 3);
        assert_eq!(metrics[0].2, 1);
    }

    #[test]
    fn error_events_expire() {
        let db = test_db();
        db.insert_error_event("ingest", "boom", -1).unwrap();
        assert_eq!(db.cleanup_expired_error_events().unwrap(), 1);
    }
}
