//! Types stored in and returned from the catalog.

use smart_debug::SmartDebug;

use crate::debug_impls::DebugBytesPrefix;

/// A cloud-originated photo and everything the engine knows about it.
#[derive(SmartDebug, Clone, PartialEq)]
pub struct Photo {
    pub id: PhotoId,
    pub provider_key: String,
    pub container_key: String,
    pub filename: String,
    pub creation_time: EpochMs,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
    pub last_viewed_at: Option<EpochMs>,
    pub cache_state: CacheState,
}

/// Opaque, provider-supplied identity. Unique across all providers in one deployment (I1).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhotoId(pub String);

impl PhotoId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhotoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliseconds since the Unix epoch.
pub type EpochMs = i64;

/// Cache state for a photo. At most one of `Blob`/`File` may be populated (P1).
#[derive(SmartDebug, Clone, PartialEq, Default)]
pub enum CacheState {
    #[default]
    Unset,
    Blob {
        #[debug(wrapper = DebugBytesPrefix)]
        bytes: Vec<u8>,
        mime_type: String,
        size_bytes: u64,
        cached_at: EpochMs,
    },
    File {
        path: std::path::PathBuf,
        size_bytes: u64,
        cached_at: EpochMs,
    },
}

impl CacheState {
    pub fn is_cached(&self) -> bool {
        !matches!(self, CacheState::Unset)
    }

    pub fn size_bytes(&self) -> u64 {
        match self {
            CacheState::Unset => 0,
            CacheState::Blob { size_bytes, .. } => *size_bytes,
            CacheState::File { size_bytes, .. } => *size_bytes,
        }
    }

    pub fn cached_at(&self) -> Option<EpochMs> {
        match self {
            CacheState::Unset => None,
            CacheState::Blob { cached_at, .. } => Some(*cached_at),
            CacheState::File { cached_at, .. } => Some(*cached_at),
        }
    }
}

/// Metadata as yielded uniformly by every `Provider` (§4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPhoto {
    pub id: PhotoId,
    pub filename: String,
    pub container_key: String,
    pub creation_time: EpochMs,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Sort policy configured at startup (§4.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Sequential,
    Random,
    Newest,
    Oldest,
}

impl std::str::FromStr for SortMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            _ => Err("expected one of: sequential, random, newest, oldest"),
        }
    }
}
