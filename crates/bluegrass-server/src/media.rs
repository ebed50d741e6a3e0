//! Hero-image mirroring (C7): fetch once, store under a stable object key,
//! rewrite the item's image URL to the internal media path.

use crate::db::Db;
use bluegrass_core::config::IMAGE_TIMEOUT;
use bluegrass_core::models::ItemMedia;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MEDIA_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Filesystem-backed object store; `item_media` is the index.
#[derive(Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        // Keys are server-generated, but the serve path takes user input.
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|seg| seg == "..") {
            return None;
        }
        Some(self.root.join(key))
    }

    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), String> {
        let path = self
            .path_for(key)
            .ok_or_else(|| format!("Invalid object key: {key}"))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Create media dir: {e}"))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| format!("Write media object: {e}"))
    }

    pub async fn read(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.ok()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map an image content type to the stored extension.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        _ => "bin",
    }
}

pub fn object_key(item_id: &str, extension: &str) -> String {
    format!("news/{item_id}.{extension}")
}

/// Mirror an item's hero image. Returns the object key, or None when the
/// source is unusable (non-https, non-image, empty, oversized, unreachable).
pub async fn mirror_image(
    db: &Db,
    store: &MediaStore,
    client: &reqwest::Client,
    item_id: &str,
    source_url: &str,
) -> Result<Option<String>, String> {
    if !source_url.starts_with("https://") {
        return Ok(None);
    }

    if let Some(existing) = db.get_media(item_id)? {
        if existing.source_url == source_url {
            return Ok(Some(existing.object_key));
        }
    }

    let response = match client.get(source_url).timeout(IMAGE_TIMEOUT).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(item_id, url = %source_url, error = %e, "Image fetch failed");
            return Ok(None);
        }
    };
    if !response.status().is_success() {
        return Ok(None);
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.starts_with("image/") {
        return Ok(None);
    }

    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(_) => return Ok(None),
    };
    if bytes.is_empty() || bytes.len() > MEDIA_MAX_BYTES {
        return Ok(None);
    }

    let key = object_key(item_id, extension_for(&content_type));
    store.write(&key, &bytes).await?;

    db.upsert_media(&ItemMedia {
        item_id: item_id.into(),
        source_url: source_url.into(),
        object_key: key.clone(),
        content_type,
        bytes: bytes.len() as i64,
        updated_at: Utc::now().to_rfc3339(),
    })?;
    db.update_item_image(item_id, &format!("/api/media/{key}"))?;

    info!(item_id, key = %key, bytes = bytes.len(), "Image mirrored");
    Ok(Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewItem;
    use bluegrass_core::canonical::item_id_from_url;
    use bluegrass_core::models::RegionScope;

    fn temp_store() -> MediaStore {
        let dir = std::env::temp_dir().join(format!("media-test-{}", uuid::Uuid::new_v4()));
        MediaStore::new(dir)
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/png; charset=binary"), "png");
        assert_eq!(extension_for("image/avif"), "avif");
        assert_eq!(extension_for("image/tiff"), "bin");
        assert_eq!(extension_for("text/html"), "bin");
    }

    #[test]
    fn object_keys_are_per_item() {
        assert_eq!(object_key("abc", "jpg"), "news/abc.jpg");
    }

    #[test]
    fn traversal_keys_rejected() {
        let store = temp_store();
        assert!(store.path_for("news/../../etc/passwd").is_none());
        assert!(store.path_for("/etc/passwd").is_none());
        assert!(store.path_for("").is_none());
        assert!(store.path_for("news/abc.jpg").is_some());
    }

    #[tokio::test]
    async fn write_read_roundtrip() {
        let store = temp_store();
        store.write("news/test.jpg", b"fakebytes").await.unwrap();
        assert_eq!(store.read("news/test.jpg").await.as_deref(), Some(&b"fakebytes"[..]));
        assert!(store.read("news/missing.jpg").await.is_none());
        let _ = tokio::fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn non_https_sources_skipped() {
        let db = Db::open(":memory:").unwrap();
        let store = temp_store();
        let client = reqwest::Client::new();
        let id = item_id_from_url("https://e.test/a");
        db.upsert_item(&NewItem {
            id: id.clone(),
            title: "A".into(),
            url: "https://e.test/a".into(),
            author: None,
            region_scope: RegionScope::Ky,
            published_at: None,
            content: None,
            image_url: None,
            fetched_at: Utc::now().to_rfc3339(),
            content_hash: None,
            article_checked_at: None,
            article_status: None,
        })
        .unwrap();

        let got = mirror_image(&db, &store, &client, &id, "http://e.test/img.jpg")
            .await
            .unwrap();
        assert!(got.is_none());
        assert!(db.get_media(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn same_source_short_circuits() {
        let db = Db::open(":memory:").unwrap();
        let store = temp_store();
        let client = reqwest::Client::new();
        let id = item_id_from_url("https://e.test/b");
        db.upsert_item(&NewItem {
            id: id.clone(),
            title: "B".into(),
            url: "https://e.test/b".into(),
            author: None,
            region_scope: RegionScope::Ky,
            published_at: None,
            content: None,
            image_url: None,
            fetched_at: Utc::now().to_rfc3339(),
            content_hash: None,
            article_checked_at: None,
            article_status: None,
        })
        .unwrap();

        db.upsert_media(&ItemMedia {
            item_id: id.clone(),
            source_url: "https://cdn.test/hero.jpg".into(),
            object_key: object_key(&id, "jpg"),
            content_type: "image/jpeg".into(),
            bytes: 10,
            updated_at: Utc::now().to_rfc3339(),
        })
        .unwrap();

        // No network call happens: the recorded source matches.
        let got = mirror_image(&db, &store, &client, &id, "https://cdn.test/hero.jpg")
            .await
            .unwrap();
        assert_eq!(got, Some(object_key(&id, "jpg")));
    }
}
