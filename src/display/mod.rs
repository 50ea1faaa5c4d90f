//! On a fixed cadence, selects the next cached photo and emits it outward (§4.5).

use base64::Engine;

use crate::catalog::{Catalog, CacheState, Photo};

#[derive(Debug, Clone, serde::Serialize)]
pub struct DisplayPayload {
    pub id: String,
    pub image: String,
    pub filename: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub creation_time: i64,
    pub location_name: Option<String>,
}

pub enum Emission {
    Photo(DisplayPayload),
    WaitingForPhotos,
}

/// Emits [`DisplayPayload`]s or status text; `engine.rs` bridges these to §6's
/// `DISPLAY_PHOTO`/`UPDATE_STATUS` host messages.
pub trait DisplaySink: Send + Sync {
    fn on_emission(&self, emission: Emission);
}

pub struct DisplayDispatcher {
    catalog: Catalog,
    sink: std::sync::Arc<dyn DisplaySink>,
}

impl DisplayDispatcher {
    pub fn new(catalog: Catalog, sink: std::sync::Arc<dyn DisplaySink>) -> Self {
        Self { catalog, sink }
    }

    /// One dispatch pass (§4.5). Called on the `update_interval` timer and once ~2s after
    /// startup, independent of that timer.
    pub fn tick(&self, now_ms: i64) {
        match self.catalog.next_display_candidate() {
            Ok(Some(photo)) => {
                let payload = self.to_payload(&photo);
                self.sink.on_emission(Emission::Photo(payload));
                // Fire-and-forget (§4.5, §9) — view-marking failure must never block display.
                self.catalog.mark_viewed(&photo.id, now_ms);
            }
            Ok(None) => {
                self.sink.on_emission(Emission::WaitingForPhotos);
            }
            Err(err) => {
                tracing::warn!(%err, "Failed to select next display candidate");
            }
        }
    }

    fn to_payload(&self, photo: &Photo) -> DisplayPayload {
        let image_bytes = match &photo.cache_state {
            CacheState::Blob { bytes, .. } => bytes.clone(),
            CacheState::File { path, .. } => std::fs::read(path).unwrap_or_else(|err| {
                // Missing cache payload on the "next" photo is a bug, not a user-facing
                // error (§7): log and emit an empty image rather than blocking display.
                tracing::warn!(%err, path = %path.display(), "Cache file missing for next photo");
                Vec::new()
            }),
            CacheState::Unset => {
                tracing::warn!(id = %photo.id, "next_display_candidate returned an uncached photo");
                Vec::new()
            }
        };

        DisplayPayload {
            id: photo.id.as_str().to_owned(),
            image: base64::engine::general_purpose::STANDARD.encode(image_bytes),
            filename: photo.filename.clone(),
            width: photo.width,
            height: photo.height,
            creation_time: photo.creation_time,
            location_name: photo.location_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PhotoId, SortMode};
    use parking_lot::Mutex;

    struct RecordingSink {
        emissions: Mutex<Vec<String>>,
    }

    impl DisplaySink for RecordingSink {
        fn on_emission(&self, emission: Emission) {
            let label = match emission {
                Emission::Photo(p) => p.id,
                Emission::WaitingForPhotos => "<waiting>".to_owned(),
            };
            self.emissions.lock().push(label);
        }
    }

    fn photo(id: &str) -> Photo {
        Photo {
            id: PhotoId::new(id),
            provider_key: "mock".into(),
            container_key: "root".into(),
            filename: format!("{id}.jpg"),
            creation_time: 1,
            width: Some(10),
            height: Some(10),
            latitude: None,
            longitude: None,
            location_name: None,
            last_viewed_at: None,
            cache_state: CacheState::Unset,
        }
    }

    #[test]
    fn emits_waiting_status_when_nothing_is_cached() {
        let catalog = Catalog::init_in_memory(SortMode::Sequential).unwrap();
        let sink = std::sync::Arc::new(RecordingSink { emissions: Mutex::new(Vec::new()) });
        let dispatcher = DisplayDispatcher::new(catalog, sink.clone());

        dispatcher.tick(1);

        assert_eq!(sink.emissions.lock()[0], "<waiting>");
    }

    #[test]
    fn emits_photo_and_marks_it_viewed() {
        let catalog = Catalog::init_in_memory(SortMode::Sequential).unwrap();
        catalog.upsert_photos(&[photo("a")]).unwrap();
        catalog.attach_blob(&PhotoId::new("a"), b"hi", "image/jpeg", 1).unwrap();
        let sink = std::sync::Arc::new(RecordingSink { emissions: Mutex::new(Vec::new()) });
        let dispatcher = DisplayDispatcher::new(catalog.clone(), sink.clone());

        dispatcher.tick(100);

        assert_eq!(sink.emissions.lock()[0], "a");
        let row = catalog.next_display_candidate().unwrap().unwrap();
        assert_eq!(row.last_viewed_at, Some(100));
    }
}
