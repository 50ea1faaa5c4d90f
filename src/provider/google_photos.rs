//! Google Photos Library API backend.
//!
//! Authentication is out of scope (§1): this provider only *reads* a bearer token that
//! external tooling refreshes on disk at `token_path`. A container is an album id, or the
//! literal string `"root"` for the whole library. Albums never nest, so `depth` is
//! accepted but has no effect beyond `0` vs. non-zero.

use std::io::Read;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::catalog::DiscoveredPhoto;
use crate::catalog::PhotoId;

use super::{ContainerSpec, DeltaResult, DownloadStream, Provider, ProviderError};

const API_BASE: &str = "https://photoslibrary.googleapis.com/v1";
const USER_AGENT: &str = concat!(
    "photoframe-engine/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com)"
);
const PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
struct ProviderConfig {
    token_path: String,
}

pub struct GooglePhotos {
    token_path: String,
    access_token: Option<String>,
    api_base: String,
}

pub fn build(provider_config: &serde_json::Value) -> anyhow::Result<Box<dyn Provider>> {
    let config: ProviderConfig = serde_json::from_value(provider_config.clone())
        .context("invalid provider_config for google_photos")?;
    Ok(Box::new(GooglePhotos {
        token_path: config.token_path,
        access_token: None,
        api_base: API_BASE.to_owned(),
    }))
}

impl GooglePhotos {
    #[cfg(test)]
    fn with_base(api_base: String, access_token: String) -> Self {
        Self {
            token_path: String::new(),
            access_token: Some(access_token),
            api_base,
        }
    }

    fn token(&self) -> Result<&str, ProviderError> {
        self.access_token
            .as_deref()
            .ok_or_else(|| ProviderError::Other(anyhow::anyhow!("provider not initialized")))
    }

    fn authed_get(&self, url: &str) -> Result<ureq::Response, ProviderError> {
        ureq::get(url)
            .set("User-Agent", USER_AGENT)
            .set("Authorization", &format!("Bearer {}", self.token()?))
            .call()
            .map_err(classify_ureq_error)
    }

    fn list_media_items(&self, album_id: Option<&str>) -> Result<Vec<DiscoveredPhoto>, ProviderError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        let api_base = &self.api_base;
        loop {
            let url = match album_id {
                Some(_) => format!("{api_base}/mediaItems:search"),
                None => format!("{api_base}/mediaItems?pageSize={PAGE_SIZE}"),
            };
            let resp = if let Some(album_id) = album_id {
                let body = serde_json::json!({
                    "albumId": album_id,
                    "pageSize": PAGE_SIZE,
                    "pageToken": page_token,
                });
                ureq::post(&url)
                    .set("User-Agent", USER_AGENT)
                    .set("Authorization", &format!("Bearer {}", self.token()?))
                    .send_json(body)
                    .map_err(classify_ureq_error)?
            } else {
                let url = match &page_token {
                    Some(token) => format!("{url}&pageToken={token}"),
                    None => url,
                };
                self.authed_get(&url)?
            };

            let page: MediaItemsPage = resp
                .into_json()
                .context("malformed mediaItems response")
                .map_err(ProviderError::from)?;

            for item in page.media_items.unwrap_or_default() {
                if !item.mime_type.starts_with("image/") {
                    continue;
                }
                out.push(item.into_discovered(album_id.unwrap_or("root")));
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(out)
    }
}

impl Provider for GooglePhotos {
    fn name(&self) -> &str {
        "google_photos"
    }

    fn init(&mut self) -> Result<(), ProviderError> {
        let token = std::fs::read_to_string(&self.token_path)
            .map(|s| s.trim().to_owned())
            .map_err(|err| ProviderError::PermissionDenied(format!("reading token_path: {err}")))?;
        if token.is_empty() {
            return Err(ProviderError::PermissionDenied("empty access token".into()));
        }
        self.access_token = Some(token);

        // Lightweight reachability + permission probe (§4.2).
        self.authed_get(&format!("{}/albums?pageSize=1", self.api_base))?;
        Ok(())
    }

    fn full_scan(&self, containers: &[ContainerSpec<'_>]) -> Result<Vec<DiscoveredPhoto>, ProviderError> {
        // Albums never nest, so `children_of` always reports no children; this still runs
        // every container through the shared cycle-safe/depth-aware walk rather than
        // special-casing the flat case here.
        let container_ids = super::container::scan(containers, |_| Ok(Vec::new()))?;

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for container_id in &container_ids {
            let album_id = if container_id == "root" { None } else { Some(container_id.as_str()) };
            for photo in self.list_media_items(album_id)? {
                if seen.insert(photo.id.clone()) {
                    out.push(photo);
                }
            }
        }
        Ok(out)
    }

    fn download(
        &self,
        photo_id: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DownloadStream>, ProviderError> {
        let url = format!("{}/mediaItems/{photo_id}", self.api_base);
        let resp = self.authed_get(&url)?;
        let item: MediaItem = resp.into_json().map_err(|err| ProviderError::Other(err.into()))?;
        let base_url = item
            .base_url
            .ok_or_else(|| ProviderError::Other(anyhow::anyhow!("media item has no baseUrl")))?;
        // `=d` requests the original bytes, per the Library API's download-parameter convention.
        let download_url = format!("{base_url}=d");

        let resp = ureq::get(&download_url)
            .set("User-Agent", USER_AGENT)
            .timeout(timeout)
            .call()
            .map_err(classify_ureq_error)?;
        Ok(Box::new(resp.into_reader()))
    }

    fn supports_delta(&self) -> bool {
        false
    }
}

fn classify_ureq_error(err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::Status(403, _) => ProviderError::PermissionDenied("403 forbidden".into()),
        ureq::Error::Status(401, _) => {
            ProviderError::PermissionDenied("authentication failed".into())
        }
        ureq::Error::Status(404, _) => ProviderError::ContainerNotFound("not found".into()),
        ureq::Error::Status(code, resp) => {
            ProviderError::Network(format!("http {code}: {}", resp.status_text()))
        }
        ureq::Error::Transport(transport) => ProviderError::Network(transport.to_string()),
        other => ProviderError::Network(other.to_string()),
    }
}

#[derive(Deserialize)]
struct MediaItemsPage {
    #[serde(rename = "mediaItems")]
    media_items: Option<Vec<MediaItem>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct MediaItem {
    id: String,
    filename: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
    #[serde(rename = "mediaMetadata")]
    media_metadata: Option<MediaMetadata>,
}

#[derive(Deserialize)]
struct MediaMetadata {
    #[serde(rename = "creationTime")]
    creation_time: Option<String>,
    width: Option<String>,
    height: Option<String>,
}

impl MediaItem {
    fn into_discovered(self, container_key: &str) -> DiscoveredPhoto {
        let metadata = self.media_metadata;
        let creation_time = metadata
            .as_ref()
            .and_then(|m| m.creation_time.as_deref())
            .and_then(parse_rfc3339_millis)
            .unwrap_or(0);
        let width = metadata.as_ref().and_then(|m| m.width.as_deref()).and_then(|w| w.parse().ok());
        let height = metadata.as_ref().and_then(|m| m.height.as_deref()).and_then(|h| h.parse().ok());

        DiscoveredPhoto {
            id: PhotoId::new(self.id),
            filename: self.filename,
            container_key: container_key.to_owned(),
            creation_time,
            width,
            height,
            latitude: None,
            longitude: None,
        }
    }
}

/// Parses an RFC 3339 UTC timestamp (`"2024-03-01T12:00:00Z"`) to epoch milliseconds
/// without pulling in a date/time crate the rest of the engine has no other use for.
fn parse_rfc3339_millis(s: &str) -> Option<i64> {
    let s = s.strip_suffix('Z')?;
    let (date, time) = s.split_once('T')?;
    let mut date_parts = date.split('-');
    let year: i64 = date_parts.next()?.parse().ok()?;
    let month: i64 = date_parts.next()?.parse().ok()?;
    let day: i64 = date_parts.next()?.parse().ok()?;

    let mut time_parts = time.split(':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: f64 = time_parts.next()?.parse().ok()?;

    let days = days_from_civil(year, month, day);
    let millis = days * 86_400_000
        + hour * 3_600_000
        + minute * 60_000
        + (second * 1000.0) as i64;
    Some(millis)
}

/// Howard Hinnant's days-from-civil algorithm (proleptic Gregorian, days since epoch).
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_to_epoch_millis() {
        assert_eq!(parse_rfc3339_millis("1970-01-01T00:00:00Z"), Some(0));
        assert_eq!(parse_rfc3339_millis("2024-03-01T12:00:00Z"), Some(1_709_294_400_000));
    }

    #[test]
    fn malformed_timestamp_yields_none() {
        assert_eq!(parse_rfc3339_millis("not-a-timestamp"), None);
    }

    #[test]
    fn full_scan_and_download_round_trip_against_a_mock_backend() {
        use crate::test_utils::server::{Body, MockServer};

        let server = MockServer::start();
        let base = server.url().to_owned();

        server.on_get("/mediaItems", {
            let base = base.clone();
            move |_| {
                Body::Json(serde_json::json!({
                    "mediaItems": [{
                        "id": "p1",
                        "filename": "beach.jpg",
                        "mimeType": "image/jpeg",
                        "baseUrl": format!("{base}/img/p1"),
                        "mediaMetadata": {
                            "creationTime": "2024-03-01T12:00:00Z",
                            "width": "1600",
                            "height": "1200",
                        },
                    }],
                }))
            }
        });
        server.on_get("/mediaItems/p1", {
            let base = base.clone();
            move |_| {
                Body::Json(serde_json::json!({
                    "id": "p1",
                    "filename": "beach.jpg",
                    "baseUrl": format!("{base}/img/p1"),
                }))
            }
        });
        server.on_get("/img/p1=d", |_| Body::Bytes(vec![0xFF, 0xD8, 0xFF, 0xD9]));

        let provider = GooglePhotos::with_base(base, "test-token".into());

        let discovered = provider
            .full_scan(&[ContainerSpec { id: "root", depth: -1 }])
            .unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].id, PhotoId::new("p1"));
        assert_eq!(discovered[0].width, Some(1600));

        let mut stream = provider.download("p1", Duration::from_secs(5)).unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }
}
