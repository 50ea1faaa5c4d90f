//! Periodic tick that keeps the local cache below budget and as full as possible (§4.3).

mod eviction;
pub mod transform;

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::catalog::{Catalog, EpochMs, PhotoId};
use crate::provider::ProviderHandle;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_ATTEMPTS: u32 = 3;
const DOWNLOAD_RETRY_BASE_MS: u64 = 1_000;
const OFFLINE_FAILURE_THRESHOLD: u32 = 3;
const OFFLINE_COOLDOWN: Duration = Duration::from_secs(60);

pub struct CacheEngineConfig {
    pub max_cache_bytes: u64,
    pub batch_size: usize,
    pub display_width: u32,
    pub display_height: u32,
    pub jpeg_quality: u8,
    pub use_blob_storage: bool,
    pub cache_dir: std::path::PathBuf,
}

/// Stats surfaced verbatim through `CACHE_STATS` (§6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: f64,
    #[serde(rename = "usagePercent")]
    pub usage_percent: f64,
    #[serde(rename = "cachedCount")]
    pub cached_count: u64,
    #[serde(rename = "totalCount")]
    pub total_count: u64,
    #[serde(rename = "cachePercent")]
    pub cache_percent: f64,
    #[serde(rename = "consecutiveFailures")]
    pub consecutive_failures: u32,
    #[serde(rename = "isOffline")]
    pub is_offline: bool,
}

/// Owns the re-entrancy guard and consecutive-failure counter (§5, §9: "one `&mut`-owned
/// state object per component"). `tick` is safe to call from a single recurring timer
/// thread; the guard only protects against an overlapping fire of that same timer.
pub struct CacheEngine {
    catalog: Catalog,
    provider: Arc<ProviderHandle>,
    config: CacheEngineConfig,
    running: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl CacheEngine {
    pub fn new(catalog: Catalog, provider: Arc<ProviderHandle>, config: CacheEngineConfig) -> Self {
        Self {
            catalog,
            provider,
            config,
            running: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn stats(&self) -> anyhow::Result<CacheStats> {
        let total_bytes = self.catalog.cache_bytes_total()?;
        let max_bytes = self.config.max_cache_bytes.max(1);
        let cached_count = self.catalog.cached_count()?;
        let total_count = self.catalog.total_count()?;
        Ok(CacheStats {
            total_size_mb: bytes_to_mb(total_bytes),
            max_size_mb: bytes_to_mb(max_bytes),
            usage_percent: total_bytes as f64 / max_bytes as f64 * 100.0,
            cached_count,
            total_count,
            cache_percent: if total_count == 0 {
                0.0
            } else {
                cached_count as f64 / total_count as f64 * 100.0
            },
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            is_offline: self.consecutive_failures.load(Ordering::Relaxed) >= OFFLINE_FAILURE_THRESHOLD,
        })
    }

    /// Runs one tick (§4.3). Returns immediately (re-entrancy guard) if a previous tick
    /// is still in flight.
    pub fn tick(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.tick_inner() {
            tracing::warn!(%err, "CacheEngine tick failed");
        }
        self.running.store(false, Ordering::Release);
    }

    fn tick_inner(&self) -> anyhow::Result<()> {
        match eviction::evict_over_budget(&self.catalog, self.config.max_cache_bytes) {
            Ok(evicted) if evicted > 0 => tracing::debug!(evicted, "Evicted over-budget photos"),
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "Eviction failed"),
        }

        if !self.provider.is_ready() {
            return Ok(());
        }

        if self.consecutive_failures.load(Ordering::Relaxed) > OFFLINE_FAILURE_THRESHOLD {
            tracing::debug!("CacheEngine cooling down after repeated failures");
            thread::sleep(OFFLINE_COOLDOWN);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return Ok(());
        }

        let candidates = self.catalog.list_fetch_candidates(self.config.batch_size)?;
        if candidates.is_empty() {
            return Ok(());
        }

        // Parallel download + transform (§4.3 step 6): one scoped thread per candidate,
        // joined back into the same settle-all-then-count-failures shape below.
        let results: Vec<bool> = thread::scope(|scope| {
            let handles: Vec<_> = candidates
                .iter()
                .map(|photo| scope.spawn(|| self.fetch_and_store(&photo.id)))
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap_or(false)).collect()
        });

        if results.iter().all(|ok| !ok) {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.consecutive_failures.store(0, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Downloads, transforms, and stores one photo. Settle-all semantics: failures here
    /// never propagate past this call (§4.3 step 6).
    fn fetch_and_store(&self, id: &PhotoId) -> bool {
        match self.download_with_retry(id) {
            Ok(bytes) => {
                if let Err(err) = self.store(id, &bytes) {
                    tracing::warn!(%id, %err, "Failed to store fetched photo");
                    false
                } else {
                    true
                }
            }
            Err(err) => {
                tracing::warn!(%id, %err, "Failed to download photo after retries");
                false
            }
        }
    }

    fn download_with_retry(&self, id: &PhotoId) -> anyhow::Result<Vec<u8>> {
        let mut last_err = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self.provider.download(id.as_str(), DOWNLOAD_TIMEOUT) {
                Ok(mut stream) => {
                    let mut bytes = Vec::new();
                    if let Err(err) = stream.read_to_end(&mut bytes) {
                        last_err = Some(anyhow::anyhow!(err));
                    } else {
                        return Ok(bytes);
                    }
                }
                Err(err) => last_err = Some(anyhow::anyhow!(err)),
            }
            if attempt < DOWNLOAD_ATTEMPTS {
                thread::sleep(Duration::from_millis(DOWNLOAD_RETRY_BASE_MS * attempt as u64));
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("download failed")))
    }

    fn store(&self, id: &PhotoId, source_bytes: &[u8]) -> anyhow::Result<()> {
        let transformed = transform::transform(
            source_bytes,
            self.config.display_width,
            self.config.display_height,
            self.config.jpeg_quality,
        );
        let cached_at: EpochMs = now_ms();

        if self.config.use_blob_storage {
            self.catalog
                .attach_blob(id, &transformed.bytes, transformed.mime_type, cached_at)?;
        } else {
            let path = self.config.cache_dir.join(format!("{}.jpg", id.as_str()));
            std::fs::create_dir_all(&self.config.cache_dir)?;
            std::fs::write(&path, &transformed.bytes)?;
            self.catalog
                .attach_file(id, &path, transformed.bytes.len() as u64, cached_at)?;
        }
        Ok(())
    }
}

fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn now_ms() -> EpochMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Photo, SortMode};
    use crate::provider::{ContainerSpec, DeltaResult, DownloadStream, Provider, ProviderError};
    use std::io::Cursor;

    struct StubProvider {
        image_bytes: Vec<u8>,
    }

    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn init(&mut self) -> Result<(), ProviderError> {
            Ok(())
        }
        fn full_scan(&self, _containers: &[ContainerSpec<'_>]) -> Result<Vec<crate::catalog::DiscoveredPhoto>, ProviderError> {
            Ok(vec![])
        }
        fn download(&self, _photo_id: &str, _timeout: Duration) -> Result<Box<dyn DownloadStream>, ProviderError> {
            Ok(Box::new(Cursor::new(self.image_bytes.clone())))
        }
    }

    fn tiny_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn photo(id: &str) -> Photo {
        Photo {
            id: PhotoId::new(id),
            provider_key: "stub".into(),
            container_key: "root".into(),
            filename: format!("{id}.jpg"),
            creation_time: 1,
            width: None,
            height: None,
            latitude: None,
            longitude: None,
            location_name: None,
            last_viewed_at: None,
            cache_state: crate::catalog::CacheState::Unset,
        }
    }

    fn config(dir: &std::path::Path) -> CacheEngineConfig {
        CacheEngineConfig {
            max_cache_bytes: 10 * 1024 * 1024,
            batch_size: 5,
            display_width: 1920,
            display_height: 1080,
            jpeg_quality: 85,
            use_blob_storage: true,
            cache_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn fetch_batch_populates_cache_state() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Catalog::init_in_memory(SortMode::Sequential).unwrap();
        catalog.upsert_photos(&[photo("a")]).unwrap();

        let provider = Arc::new(ProviderHandle::new(Box::new(StubProvider {
            image_bytes: tiny_jpeg(),
        })));
        provider.init().unwrap();

        let engine = CacheEngine::new(catalog.clone(), provider, config(tmp.path()));
        engine.tick();

        assert_eq!(catalog.cached_count().unwrap(), 1);
    }

    #[test]
    fn tick_is_a_no_op_while_provider_is_not_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Catalog::init_in_memory(SortMode::Sequential).unwrap();
        catalog.upsert_photos(&[photo("a")]).unwrap();

        let provider = Arc::new(ProviderHandle::new(Box::new(StubProvider {
            image_bytes: tiny_jpeg(),
        })));
        // Deliberately not initialized.

        let engine = CacheEngine::new(catalog.clone(), provider, config(tmp.path()));
        engine.tick();

        assert_eq!(catalog.cached_count().unwrap(), 0);
    }

    #[test]
    fn eviction_runs_before_fetch_when_over_budget() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Catalog::init_in_memory(SortMode::Sequential).unwrap();
        catalog.upsert_photos(&[photo("a"), photo("b")]).unwrap();
        catalog
            .attach_blob(&PhotoId::new("a"), &vec![0u8; 5 * 1024 * 1024], "image/jpeg", 1)
            .unwrap();
        catalog.mark_viewed(&PhotoId::new("a"), 1);

        let provider = Arc::new(ProviderHandle::new(Box::new(StubProvider {
            image_bytes: tiny_jpeg(),
        })));
        provider.init().unwrap();

        let mut cfg = config(tmp.path());
        cfg.max_cache_bytes = 1024;
        let engine = CacheEngine::new(catalog.clone(), provider, cfg);
        engine.tick();

        assert!(catalog.cache_bytes_total().unwrap() <= 1024 * 1024);
    }
}
