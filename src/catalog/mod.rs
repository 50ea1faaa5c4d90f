//! Durable, crash-safe store and query layer for photos and settings (§4.1).
//!
//! The catalog is the sole mutator of persistent state. It serializes every mutation
//! behind a single connection, shared by every component via a cheap `Clone`.

mod db;
pub mod model;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

pub use model::{CacheState, DiscoveredPhoto, EpochMs, Photo, PhotoId, SortMode};

use db::Db;

#[derive(Clone)]
pub struct Catalog {
    inner: Arc<Mutex<Db>>,
    sort_mode: SortMode,
}

impl Catalog {
    /// Opens the store at `path`; on corruption, deletes and recreates it. An empty
    /// catalog is a valid recovery state — it simply triggers a full resync.
    pub fn init(path: &Path, sort_mode: SortMode) -> anyhow::Result<Self> {
        let db = match Db::open_or_create(path) {
            Ok(db) if db.integrity_check().unwrap_or(false) => db,
            _ => {
                tracing::warn!(path = %path.display(), "Catalog failed integrity check; rebuilding");
                let _ = std::fs::remove_file(path);
                Db::open_or_create(path)?
            }
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
            sort_mode,
        })
    }

    #[cfg(test)]
    pub fn init_in_memory(sort_mode: SortMode) -> anyhow::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(Db::open_in_memory()?)),
            sort_mode,
        })
    }

    pub fn upsert_photos(&self, photos: &[Photo]) -> anyhow::Result<()> {
        self.inner.lock().upsert_photos(photos)
    }

    pub fn delete_photo(&self, id: &PhotoId) -> anyhow::Result<()> {
        self.inner.lock().delete_photo(id)
    }

    pub fn next_display_candidate(&self) -> anyhow::Result<Option<Photo>> {
        self.inner.lock().next_display_candidate(self.sort_mode)
    }

    /// Updates `last_viewed_at` if `now_ms` is strictly greater (I5). Errors are
    /// swallowed — view-marking is fire-and-forget and must never block display (§4.1).
    pub fn mark_viewed(&self, id: &PhotoId, now_ms: EpochMs) {
        if let Err(err) = self.inner.lock().mark_viewed(id, now_ms) {
            tracing::warn!(%id, %err, "Failed to record view");
        }
    }

    pub fn list_fetch_candidates(&self, limit: usize) -> anyhow::Result<Vec<Photo>> {
        self.inner.lock().list_fetch_candidates(limit)
    }

    pub fn list_eviction_candidates(&self, limit: usize) -> anyhow::Result<Vec<Photo>> {
        self.inner.lock().list_eviction_candidates(limit)
    }

    pub fn attach_blob(
        &self,
        id: &PhotoId,
        bytes: &[u8],
        mime_type: &str,
        cached_at: EpochMs,
    ) -> anyhow::Result<()> {
        self.inner.lock().attach_blob(id, bytes, mime_type, cached_at)
    }

    pub fn attach_file(
        &self,
        id: &PhotoId,
        path: &Path,
        size_bytes: u64,
        cached_at: EpochMs,
    ) -> anyhow::Result<()> {
        self.inner.lock().attach_file(id, path, size_bytes, cached_at)
    }

    pub fn clear_cache(&self, id: &PhotoId) -> anyhow::Result<()> {
        self.inner.lock().clear_cache(id)
    }

    pub fn cache_bytes_total(&self) -> anyhow::Result<u64> {
        self.inner.lock().cache_bytes_total()
    }

    pub fn cached_count(&self) -> anyhow::Result<u64> {
        self.inner.lock().cached_count()
    }

    pub fn total_count(&self) -> anyhow::Result<u64> {
        self.inner.lock().total_count()
    }

    pub fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.lock().get_setting(key)
    }

    pub fn put_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.lock().put_setting(key, value)
    }

    pub fn delta_token_key(provider_key: &str) -> String {
        format!("delta_token:{provider_key}")
    }

    pub fn get_delta_token(&self, provider_key: &str) -> anyhow::Result<Option<String>> {
        self.get_setting(&Self::delta_token_key(provider_key))
    }

    pub fn put_delta_token(&self, provider_key: &str, token: &str) -> anyhow::Result<()> {
        self.put_setting(&Self::delta_token_key(provider_key), token)
    }
}

pub fn default_path(data_dir: &Path) -> PathBuf {
    data_dir.join("catalog.db3")
}
