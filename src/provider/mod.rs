//! Uniform adapter over a cloud backend (§4.2).
//!
//! A deployment uses exactly one [`Provider`] at a time. The trait is shaped so that
//! multi-provider support (a future extension) only needs a registry with more than one
//! entry — nothing about the trait itself assumes a single active provider.

pub mod container;
pub mod google_photos;

use std::time::Duration;

use crate::catalog::DiscoveredPhoto;

/// A single container to scan: `depth = -1` is unbounded, `0` is that container only,
/// `N` reaches at most `N` levels below it.
#[derive(Debug, Clone, Copy)]
pub struct ContainerSpec<'a> {
    pub id: &'a str,
    pub depth: i32,
}

pub struct DeltaResult {
    pub added_or_modified: Vec<DiscoveredPhoto>,
    pub deleted_ids: Vec<String>,
    pub next_token: String,
}

/// Distinguishes failures the [`crate::sync::classify`] module cannot retry its way out of
/// from failures worth retrying. Concrete providers should prefer returning [`ProviderError`]
/// directly; an equivalent is an opaque `anyhow::Error` whose message contains one of the
/// substrings in `sync::classify` (§4.2's "tagged error, or well-known substrings").
#[derive(Debug)]
pub enum ProviderError {
    PermissionDenied(String),
    ContainerNotFound(String),
    Network(String),
    Timeout,
    Other(anyhow::Error),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            ProviderError::ContainerNotFound(msg) => write!(f, "container not found: {msg}"),
            ProviderError::Network(msg) => write!(f, "network error: {msg}"),
            ProviderError::Timeout => write!(f, "request timed out"),
            ProviderError::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::Other(err)
    }
}

/// A lazily-read byte stream for a single photo's original bytes.
pub trait DownloadStream: std::io::Read + Send {}
impl<T: std::io::Read + Send> DownloadStream for T {}

pub trait Provider: Send {
    /// Human label for logs.
    fn name(&self) -> &str;

    /// Acquires credentials and verifies reachability with one lightweight call that
    /// fails fast on permanent-permission errors.
    fn init(&mut self) -> Result<(), ProviderError>;

    /// Enumerates all image entries under every configured container, deduplicated by
    /// `photo_id`, never enumerating non-image MIME types, and terminating on cyclic
    /// container graphs.
    fn full_scan(&self, containers: &[ContainerSpec<'_>]) -> Result<Vec<DiscoveredPhoto>, ProviderError>;

    /// Returns a lazy byte stream of the original image.
    fn download(
        &self,
        photo_id: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DownloadStream>, ProviderError>;

    /// Whether this provider supports incremental sync via [`Provider::delta_start_token`]
    /// and [`Provider::delta`]. Providers without delta fall back to `full_scan` every cycle.
    fn supports_delta(&self) -> bool {
        false
    }

    fn delta_start_token(&self) -> Result<String, ProviderError> {
        Err(ProviderError::Other(anyhow::anyhow!(
            "{} does not support delta sync",
            self.name()
        )))
    }

    fn delta(&self, _token: &str) -> Result<DeltaResult, ProviderError> {
        Err(ProviderError::Other(anyhow::anyhow!(
            "{} does not support delta sync",
            self.name()
        )))
    }
}

/// Startup-time map from `provider_key` to a constructor, per REDESIGN FLAGS (§9): the
/// source's registry of factory closures and runtime class lookup becomes a compile-time
/// map here.
pub type ProviderFactory = fn(&serde_json::Value) -> anyhow::Result<Box<dyn Provider>>;

pub fn registry() -> std::collections::HashMap<&'static str, ProviderFactory> {
    let mut map: std::collections::HashMap<&'static str, ProviderFactory> = Default::default();
    map.insert("google_photos", google_photos::build);
    map
}

pub fn build(provider_key: &str, provider_config: &serde_json::Value) -> anyhow::Result<Box<dyn Provider>> {
    let factory = registry()
        .remove(provider_key)
        .ok_or_else(|| anyhow::anyhow!("Unknown provider_key: {provider_key}"))?;
    factory(provider_config)
}

/// Shared handle to the single active Provider (§4.2, §5). `SyncController` owns the
/// initialization lifecycle (calling [`ProviderHandle::init`]); `CacheEngine` only reads
/// `is_ready` and calls `download`/`full_scan` directly on the handle. The `ready` flag is
/// the "has init() ever succeeded" gate CacheEngine's tick checks (§4.3 step 3) without
/// needing its own copy of the Provider.
pub struct ProviderHandle {
    inner: parking_lot::Mutex<Box<dyn Provider>>,
    ready: std::sync::atomic::AtomicBool,
}

impl ProviderHandle {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            inner: parking_lot::Mutex::new(provider),
            ready: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Runs `init()` and updates the readiness flag. Called only by the SyncController.
    pub fn init(&self) -> Result<(), ProviderError> {
        let result = self.inner.lock().init();
        self.ready
            .store(result.is_ok(), std::sync::atomic::Ordering::Release);
        result
    }

    pub fn mark_unready(&self) {
        self.ready.store(false, std::sync::atomic::Ordering::Release);
    }

    pub fn name(&self) -> String {
        self.inner.lock().name().to_owned()
    }

    pub fn full_scan(&self, containers: &[ContainerSpec<'_>]) -> Result<Vec<DiscoveredPhoto>, ProviderError> {
        self.inner.lock().full_scan(containers)
    }

    pub fn download(
        &self,
        photo_id: &str,
        timeout: std::time::Duration,
    ) -> Result<Box<dyn DownloadStream>, ProviderError> {
        self.inner.lock().download(photo_id, timeout)
    }

    pub fn supports_delta(&self) -> bool {
        self.inner.lock().supports_delta()
    }

    pub fn delta_start_token(&self) -> Result<String, ProviderError> {
        self.inner.lock().delta_start_token()
    }

    pub fn delta(&self, token: &str) -> Result<DeltaResult, ProviderError> {
        self.inner.lock().delta(token)
    }
}
