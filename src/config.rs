//! Configuration recognized via the host's `INIT { config }` message (§6).
//!
//! Unlike the teacher's toml-on-disk config, this engine's primary configuration arrives
//! as an embedded JSON map from the host process, so [`Config`] derives `Deserialize`
//! directly rather than going through a file-loading step. Invalid values fall back to
//! defaults with a warning, per §6.

use std::path::PathBuf;

use serde::Deserialize;

use crate::catalog::SortMode;

fn default_update_interval_ms() -> u64 {
    60_000
}

fn default_scan_interval_ms() -> u64 {
    6 * 60 * 60 * 1_000
}

fn default_max_cache_mb() -> u64 {
    200
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_display_dim() -> u32 {
    1920
}

fn default_max_auth_backoff_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    pub id: String,
    #[serde(default)]
    pub depth: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub provider_key: String,
    pub provider_config: serde_json::Value,
    pub containers: Vec<ContainerConfig>,
    pub display_width: u32,
    pub display_height: u32,
    pub update_interval: u64,
    pub scan_interval: u64,
    pub max_cache_mb: u64,
    pub jpeg_quality: u8,
    pub use_blob_storage: bool,
    pub sort_mode: String,
    pub max_auth_retries: Option<u32>,
    pub max_auth_backoff_ms: u64,
    pub credentials_path: Option<String>,
    pub token_path: Option<String>,
    pub data_dir: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            provider_key: String::new(),
            provider_config: serde_json::Value::Null,
            containers: Vec::new(),
            display_width: default_display_dim(),
            display_height: default_display_dim(),
            update_interval: default_update_interval_ms(),
            scan_interval: default_scan_interval_ms(),
            max_cache_mb: default_max_cache_mb(),
            jpeg_quality: default_jpeg_quality(),
            use_blob_storage: true,
            sort_mode: "sequential".to_owned(),
            max_auth_retries: None,
            max_auth_backoff_ms: default_max_auth_backoff_ms(),
            credentials_path: None,
            token_path: None,
            data_dir: None,
        }
    }
}

/// Validated configuration the rest of the engine is built from. Every field that could
/// be invalid in [`RawConfig`] has already been checked and defaulted here.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider_key: String,
    pub provider_config: serde_json::Value,
    pub containers: Vec<ContainerConfig>,
    pub display_width: u32,
    pub display_height: u32,
    pub update_interval_ms: u64,
    pub scan_interval_ms: u64,
    pub max_cache_bytes: u64,
    pub jpeg_quality: u8,
    pub use_blob_storage: bool,
    pub sort_mode: SortMode,
    pub max_auth_retries: Option<u32>,
    pub max_auth_backoff_ms: u64,
    pub credentials_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    pub data_dir: PathBuf,
}

const MIN_UPDATE_INTERVAL_MS: u64 = 10_000;
const MIN_AUTH_BACKOFF_MS: u64 = 5_000;
const MAX_AUTH_BACKOFF_MS: u64 = 600_000;

impl Config {
    /// Parses `raw_json` into a [`RawConfig`] and validates every field, logging a warning
    /// and substituting the default for anything out of range (§6).
    pub fn from_json(raw_json: &serde_json::Value, default_data_dir: PathBuf) -> Self {
        let raw: RawConfig = match serde_json::from_value(raw_json.clone()) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(%err, "Malformed config; falling back to defaults");
                RawConfig::default()
            }
        };
        Self::from_raw(raw, default_data_dir)
    }

    fn from_raw(raw: RawConfig, default_data_dir: PathBuf) -> Self {
        let update_interval_ms = if raw.update_interval < MIN_UPDATE_INTERVAL_MS {
            tracing::warn!(
                value = raw.update_interval,
                min = MIN_UPDATE_INTERVAL_MS,
                "update_interval below minimum; using minimum"
            );
            MIN_UPDATE_INTERVAL_MS
        } else {
            raw.update_interval
        };

        let max_auth_backoff_ms = raw
            .max_auth_backoff_ms
            .clamp(MIN_AUTH_BACKOFF_MS, MAX_AUTH_BACKOFF_MS);

        let jpeg_quality = if (1..=100).contains(&raw.jpeg_quality) {
            raw.jpeg_quality
        } else {
            tracing::warn!(value = raw.jpeg_quality, "jpeg_quality out of range; using default");
            default_jpeg_quality()
        };

        let sort_mode = raw.sort_mode.parse().unwrap_or_else(|err| {
            tracing::warn!(value = %raw.sort_mode, %err, "invalid sort_mode; using default");
            SortMode::default()
        });

        Self {
            provider_key: raw.provider_key,
            provider_config: raw.provider_config,
            containers: raw.containers,
            display_width: raw.display_width.max(1),
            display_height: raw.display_height.max(1),
            update_interval_ms,
            scan_interval_ms: raw.scan_interval.max(1),
            max_cache_bytes: raw.max_cache_mb.max(1) * 1024 * 1024,
            jpeg_quality,
            use_blob_storage: raw.use_blob_storage,
            sort_mode,
            max_auth_retries: raw.max_auth_retries,
            max_auth_backoff_ms,
            credentials_path: raw.credentials_path.map(PathBuf::from),
            token_path: raw.token_path.map(PathBuf::from),
            data_dir: raw.data_dir.map(PathBuf::from).unwrap_or(default_data_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_dir() -> PathBuf {
        PathBuf::from("/tmp/photoframe-test")
    }

    #[test]
    fn below_minimum_update_interval_falls_back() {
        let raw = serde_json::json!({
            "provider_key": "google_photos",
            "update_interval": 500,
        });
        let config = Config::from_json(&raw, data_dir());
        assert_eq!(config.update_interval_ms, MIN_UPDATE_INTERVAL_MS);
    }

    #[test]
    fn invalid_jpeg_quality_falls_back_to_default() {
        let raw = serde_json::json!({ "provider_key": "google_photos", "jpeg_quality": 255 });
        let config = Config::from_json(&raw, data_dir());
        assert_eq!(config.jpeg_quality, 85);
    }

    #[test]
    fn invalid_sort_mode_falls_back_to_sequential() {
        let raw = serde_json::json!({ "provider_key": "google_photos", "sort_mode": "shuffle" });
        let config = Config::from_json(&raw, data_dir());
        assert_eq!(config.sort_mode, SortMode::Sequential);
    }

    #[test]
    fn auth_backoff_is_clamped_to_bounds() {
        let raw = serde_json::json!({ "provider_key": "google_photos", "max_auth_backoff_ms": 1 });
        let config = Config::from_json(&raw, data_dir());
        assert_eq!(config.max_auth_backoff_ms, MIN_AUTH_BACKOFF_MS);
    }

    #[test]
    fn malformed_json_falls_back_to_full_defaults() {
        let raw = serde_json::json!({ "provider_key": 42 });
        let config = Config::from_json(&raw, data_dir());
        assert_eq!(config.provider_key, "");
        assert_eq!(config.max_cache_bytes, 200 * 1024 * 1024);
    }
}
